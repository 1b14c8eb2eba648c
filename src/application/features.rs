//! Feature engineering: projects indicator values plus market context
//! into the fixed, ordered vector the classifier was trained on.

use crate::application::indicators::{IndicatorSet, value};
use crate::domain::portfolio::MarketContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The model's input names, in training order. The list is the single
/// source of truth for the input width.
pub const FEATURE_NAMES: [&str; 43] = [
    // Price-based
    "return_1d",
    "return_5d",
    "return_10d",
    "return_20d",
    "high_low_ratio",
    "close_open_ratio",
    "price_vs_sma20",
    "price_vs_sma50",
    "price_vs_sma200",
    "gap_percentage",
    // Technical indicators
    "rsi_14",
    "macd_signal_diff",
    "macd_histogram",
    "bb_position",
    "adx_14",
    "cci_20",
    "stoch_k",
    "stoch_d",
    "obv_slope",
    "vwap_diff",
    "atr_14",
    "atr_ratio",
    "williams_r",
    "parabolic_sar_signal",
    "ema12_ema26_cross",
    "sma20_sma50_cross",
    "volume_vs_sma20",
    "volume_ratio_5d",
    "keltner_position",
    "roc_10",
    // Composite
    "trend_alignment_score",
    "bb_squeeze",
    "volume_breakout_score",
    "momentum_divergence",
    "rsi_macd_agreement",
    // Market context
    "spy_return_1d",
    "vix_level",
    "vix_change",
    // Derived
    "volume_price_confirmation",
    "trend_strength_composite",
    "mean_reversion_score",
    "breakout_probability",
    "support_resistance_proximity",
];

/// A fully populated feature mapping. Building it twice from the same
/// inputs yields the same output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    /// Values in [`FEATURE_NAMES`] order, ready for the model matrix.
    pub fn to_ordered_vec(&self) -> Vec<f64> {
        FEATURE_NAMES.iter().map(|name| self.get(name)).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(serde_json::Value::Null)
    }

    /// Top `n` features by absolute value, for the audit trail.
    pub fn top_by_magnitude(&self, n: usize) -> Vec<(String, f64)> {
        let mut entries: Vec<(String, f64)> =
            self.0.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(n);
        entries
    }
}

fn clean(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Builds the feature vector. Missing indicators fall back to typed
/// neutral defaults so the vector is always fully populated.
pub fn build_features(indicators: &IndicatorSet, ctx: &MarketContext) -> Option<FeatureVector> {
    if indicators.is_empty() {
        return None;
    }

    let get = |name: &str, default: f64| value(indicators, name).unwrap_or(default);
    let mut f: BTreeMap<String, f64> = BTreeMap::new();

    // Price-based
    f.insert("return_1d".into(), get("return_1d", 0.0));
    f.insert("return_5d".into(), get("return_5d", 0.0));
    f.insert("return_10d".into(), get("return_10d", 0.0));
    f.insert("return_20d".into(), get("return_20d", 0.0));
    f.insert("high_low_ratio".into(), get("high_low_ratio", 1.0));
    f.insert("close_open_ratio".into(), get("close_open_ratio", 1.0));
    f.insert("price_vs_sma20".into(), get("price_vs_sma20", 1.0));
    f.insert("price_vs_sma50".into(), get("price_vs_sma50", 1.0));
    f.insert("price_vs_sma200".into(), get("price_vs_sma200", 1.0));
    f.insert("gap_percentage".into(), get("gap_percentage", 0.0));

    // Technical
    f.insert("rsi_14".into(), get("rsi_14", 50.0));
    let macd = get("macd", 0.0);
    let macd_sig = get("macd_signal", 0.0);
    f.insert("macd_signal_diff".into(), macd - macd_sig);
    f.insert("macd_histogram".into(), get("macd_histogram", 0.0));
    f.insert("bb_position".into(), get("bb_position", 0.5));
    f.insert("adx_14".into(), get("adx_14", 20.0));
    f.insert("cci_20".into(), get("cci_20", 0.0));
    f.insert("stoch_k".into(), get("stoch_k", 50.0));
    f.insert("stoch_d".into(), get("stoch_d", 50.0));
    f.insert("obv_slope".into(), get("obv_slope", 0.0));
    f.insert("vwap_diff".into(), get("vwap_diff", 0.0));
    f.insert("atr_14".into(), get("atr_14", 0.0));
    f.insert("atr_ratio".into(), get("atr_ratio", 0.02));
    f.insert("williams_r".into(), get("williams_r", -50.0));
    f.insert("parabolic_sar_signal".into(), get("parabolic_sar_signal", 0.0));
    f.insert("ema12_ema26_cross".into(), get("ema12_ema26_cross", 0.0));
    f.insert("sma20_sma50_cross".into(), get("sma20_sma50_cross", 0.0));
    f.insert("volume_vs_sma20".into(), get("volume_vs_sma20", 1.0));
    f.insert("volume_ratio_5d".into(), get("volume_ratio_5d", 1.0));
    f.insert("keltner_position".into(), get("keltner_position", 0.5));
    f.insert("roc_10".into(), get("roc_10", 0.0));

    // Composite
    f.insert("rsi_macd_agreement".into(), get("rsi_macd_agreement", 0.0));
    f.insert(
        "volume_price_confirmation".into(),
        get("volume_price_confirmation", 0.0),
    );
    f.insert("bb_squeeze".into(), get("bb_squeeze", 0.0));

    let sign = |v: f64| if v > 0.0 { 1.0 } else { -1.0 };
    let trend_alignment = (sign(f["ema12_ema26_cross"])
        + sign(f["sma20_sma50_cross"])
        + sign(f["macd_histogram"])
        + sign(f["parabolic_sar_signal"]))
        / 4.0;
    f.insert("trend_alignment_score".into(), trend_alignment);

    let volume_breakout = (f["volume_vs_sma20"] / 2.0).min(1.0);
    f.insert("volume_breakout_score".into(), volume_breakout);

    let rsi_bull = f["rsi_14"] > 50.0;
    let price_bull = f["return_5d"] > 0.0;
    f.insert(
        "momentum_divergence".into(),
        if rsi_bull == price_bull { 0.0 } else { 1.0 },
    );

    // Market context
    f.insert("spy_return_1d".into(), ctx.spy_return_1d);
    f.insert("vix_level".into(), ctx.vix);
    f.insert("vix_change".into(), ctx.vix_change);

    // Derived
    f.insert(
        "trend_strength_composite".into(),
        (f["adx_14"] / 50.0).abs() * trend_alignment,
    );
    f.insert(
        "mean_reversion_score".into(),
        (1.0 - f["price_vs_sma20"]).abs(),
    );
    f.insert(
        "breakout_probability".into(),
        (volume_breakout * (f["bb_position"] - 0.5).abs() * 2.0).min(1.0),
    );
    f.insert(
        "support_resistance_proximity".into(),
        f["bb_position"].min(1.0 - f["bb_position"]),
    );

    let cleaned: BTreeMap<String, f64> =
        f.into_iter().map(|(k, v)| (k, clean(v))).collect();
    Some(FeatureVector(cleaned))
}
