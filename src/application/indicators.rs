//! Technical indicator engine.
//!
//! `compute_all` is pure: it maps an ordered OHLCV series (oldest first)
//! to the named indicator values of the latest bar. The `IndicatorEngine`
//! wrapper loads history from the bar table and upserts one snapshot row
//! per (symbol, timeframe, timestamp).

use crate::domain::types::Bar;
use crate::infrastructure::persistence::repositories::{BarRepository, IndicatorRepository};
use anyhow::Result;
use sqlx::SqliteConnection;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Indicator name to value. None marks an indicator undefined for the
/// available window (or a NaN that was normalized away).
pub type IndicatorSet = BTreeMap<String, Option<f64>>;

/// Minimum history for a full computation.
pub const MIN_BARS: usize = 50;
/// History window loaded per (symbol, timeframe).
pub const HISTORY_BARS: usize = 250;

fn put(ind: &mut IndicatorSet, key: &str, value: Option<f64>) {
    ind.insert(key.to_string(), value.filter(|v| v.is_finite()));
}

/// Flattened read: missing key and stored None look the same.
pub fn value(ind: &IndicatorSet, key: &str) -> Option<f64> {
    ind.get(key).copied().flatten()
}

// ===== Series helpers =====

fn sma_last(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period || period == 0 {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Recursive EMA seeded with the first value, alpha = 2 / (period + 1).
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Wilder RSI over closes; None until period + 1 points exist.
fn wilder_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() <= period {
        return None;
    }
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn true_ranges(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(highs.len());
    out.push(highs[0] - lows[0]);
    for i in 1..highs.len() {
        let h_l = highs[i] - lows[i];
        let h_pc = (highs[i] - closes[i - 1]).abs();
        let l_pc = (lows[i] - closes[i - 1]).abs();
        out.push(h_l.max(h_pc).max(l_pc));
    }
    out
}

/// Wilder ATR: simple average of the first `period` true ranges, then
/// (prev * (period - 1) + tr) / period.
fn wilder_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    if highs.len() <= period {
        return None;
    }
    let trs = true_ranges(highs, lows, closes);
    let mut atr = trs[1..=period].iter().sum::<f64>() / period as f64;
    for tr in &trs[period + 1..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(atr)
}

/// Wilder ADX; needs roughly 2x period of history.
fn wilder_adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = highs.len();
    if n < 2 * period + 1 {
        return None;
    }

    let mut trs = Vec::with_capacity(n - 1);
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        let h_l = highs[i] - lows[i];
        let h_pc = (highs[i] - closes[i - 1]).abs();
        let l_pc = (lows[i] - closes[i - 1]).abs();
        trs.push(h_l.max(h_pc).max(l_pc));
    }

    let p = period as f64;
    let mut sm_tr: f64 = trs[..period].iter().sum();
    let mut sm_plus: f64 = plus_dm[..period].iter().sum();
    let mut sm_minus: f64 = minus_dm[..period].iter().sum();

    let dx_at = |sm_tr: f64, sm_plus: f64, sm_minus: f64| -> f64 {
        if sm_tr <= 0.0 {
            return 0.0;
        }
        let pdi = 100.0 * sm_plus / sm_tr;
        let mdi = 100.0 * sm_minus / sm_tr;
        if pdi + mdi == 0.0 {
            0.0
        } else {
            100.0 * (pdi - mdi).abs() / (pdi + mdi)
        }
    };

    let mut dx_values = vec![dx_at(sm_tr, sm_plus, sm_minus)];
    for i in period..trs.len() {
        sm_tr = sm_tr - sm_tr / p + trs[i];
        sm_plus = sm_plus - sm_plus / p + plus_dm[i];
        sm_minus = sm_minus - sm_minus / p + minus_dm[i];
        dx_values.push(dx_at(sm_tr, sm_plus, sm_minus));
    }

    if dx_values.len() < period {
        return None;
    }
    let mut adx = dx_values[..period].iter().sum::<f64>() / p;
    for dx in &dx_values[period..] {
        adx = (adx * (p - 1.0) + dx) / p;
    }
    Some(adx)
}

/// Parabolic SAR with standard acceleration (0.02 step, 0.2 cap).
/// Returns the SAR of the latest bar.
fn parabolic_sar(highs: &[f64], lows: &[f64]) -> Option<f64> {
    if highs.len() < 2 {
        return None;
    }
    let step = 0.02;
    let max_af = 0.2;
    let mut af = step;
    let mut uptrend = highs[1] + lows[1] > highs[0] + lows[0];
    let mut sar = if uptrend { lows[0] } else { highs[0] };
    let mut ep = if uptrend { highs[0] } else { lows[0] };

    for i in 1..highs.len() {
        sar += af * (ep - sar);
        if uptrend {
            sar = sar.min(lows[i - 1]);
            if i >= 2 {
                sar = sar.min(lows[i - 2]);
            }
            if lows[i] < sar {
                uptrend = false;
                sar = ep;
                ep = lows[i];
                af = step;
            } else if highs[i] > ep {
                ep = highs[i];
                af = (af + step).min(max_af);
            }
        } else {
            sar = sar.max(highs[i - 1]);
            if i >= 2 {
                sar = sar.max(highs[i - 2]);
            }
            if highs[i] > sar {
                uptrend = true;
                sar = ep;
                ep = highs[i];
                af = step;
            } else if lows[i] < ep {
                ep = lows[i];
                af = (af + step).min(max_af);
            }
        }
    }
    Some(sar)
}

/// Stochastic %K (fast) and %D (3-bar SMA of %K).
fn stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    d_period: usize,
) -> (Option<f64>, Option<f64>) {
    let n = closes.len();
    if n < k_period {
        return (None, None);
    }
    let k_at = |end: usize| -> f64 {
        let window = end - k_period..end;
        let hh = highs[window.clone()].iter().cloned().fold(f64::MIN, f64::max);
        let ll = lows[window].iter().cloned().fold(f64::MAX, f64::min);
        if hh - ll <= 0.0 {
            50.0
        } else {
            100.0 * (closes[end - 1] - ll) / (hh - ll)
        }
    };
    let k = k_at(n);
    let d = if n >= k_period + d_period - 1 {
        let sum: f64 = (0..d_period).map(|j| k_at(n - j)).sum();
        Some(sum / d_period as f64)
    } else {
        None
    };
    (Some(k), d)
}

fn williams_r(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if n < period {
        return None;
    }
    let hh = highs[n - period..].iter().cloned().fold(f64::MIN, f64::max);
    let ll = lows[n - period..].iter().cloned().fold(f64::MAX, f64::min);
    if hh - ll <= 0.0 {
        return Some(-50.0);
    }
    Some(-100.0 * (hh - closes[n - 1]) / (hh - ll))
}

fn cci(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if n < period {
        return None;
    }
    let tp: Vec<f64> = (n - period..n)
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();
    let mean = tp.iter().sum::<f64>() / period as f64;
    let mean_dev = tp.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
    if mean_dev <= 0.0 {
        return Some(0.0);
    }
    Some((tp[period - 1] - mean) / (0.015 * mean_dev))
}

fn pct_change(closes: &[f64], lag: usize) -> Option<f64> {
    let n = closes.len();
    if n <= lag {
        return None;
    }
    let base = closes[n - 1 - lag];
    if base == 0.0 {
        return None;
    }
    Some(closes[n - 1] / base - 1.0)
}

// ===== Full computation =====

/// Computes every indicator for the latest bar of `bars` (oldest first).
/// Returns None when fewer than [`MIN_BARS`] bars are available.
pub fn compute_all(bars: &[Bar]) -> Option<IndicatorSet> {
    if bars.len() < MIN_BARS {
        return None;
    }

    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
    let n = bars.len();
    let close = closes[n - 1];

    let mut ind = IndicatorSet::new();

    // Trend
    let sma_20 = sma_last(&closes, 20);
    let sma_50 = sma_last(&closes, 50);
    let sma_200 = sma_last(&closes, 200);
    put(&mut ind, "sma_20", sma_20);
    put(&mut ind, "sma_50", sma_50);
    put(&mut ind, "sma_200", sma_200);

    let ema12 = ema_series(&closes, 12);
    let ema26 = ema_series(&closes, 26);
    put(&mut ind, "ema_12", ema12.last().copied());
    put(&mut ind, "ema_26", ema26.last().copied());

    let macd_line: Vec<f64> = ema12.iter().zip(&ema26).map(|(f, s)| f - s).collect();
    let signal_line = ema_series(&macd_line, 9);
    let macd = macd_line[n - 1];
    let macd_signal = signal_line[n - 1];
    put(&mut ind, "macd", Some(macd));
    put(&mut ind, "macd_signal", Some(macd_signal));
    put(&mut ind, "macd_histogram", Some(macd - macd_signal));

    put(&mut ind, "adx_14", wilder_adx(&highs, &lows, &closes, 14));

    let psar = parabolic_sar(&highs, &lows);
    put(&mut ind, "parabolic_sar", psar);
    put(
        &mut ind,
        "parabolic_sar_signal",
        psar.map(|s| if close > s { 1.0 } else { -1.0 }),
    );

    // Momentum
    put(&mut ind, "rsi_14", wilder_rsi(&closes, 14));

    let (stoch_k, stoch_d) = stochastic(&highs, &lows, &closes, 14, 3);
    put(&mut ind, "stoch_k", stoch_k);
    put(&mut ind, "stoch_d", stoch_d);

    put(&mut ind, "williams_r", williams_r(&highs, &lows, &closes, 14));
    put(&mut ind, "cci_20", cci(&highs, &lows, &closes, 20));
    put(&mut ind, "roc_10", pct_change(&closes, 10).map(|r| r * 100.0));

    // Volatility
    let bb = sma_20.map(|mid| {
        let sd = population_std(&closes[n - 20..]);
        (mid + 2.0 * sd, mid - 2.0 * sd, mid)
    });
    put(&mut ind, "bb_high", bb.map(|(h, _, _)| h));
    put(&mut ind, "bb_low", bb.map(|(_, l, _)| l));
    put(&mut ind, "bb_mid", bb.map(|(_, _, m)| m));
    let bb_position = bb.map(|(h, l, _)| {
        if h - l > 0.0 {
            ((close - l) / (h - l)).clamp(0.0, 1.0)
        } else {
            0.5
        }
    });
    put(&mut ind, "bb_position", bb_position);
    put(
        &mut ind,
        "bb_squeeze",
        bb.and_then(|(h, l, m)| if m > 0.0 { Some((h - l) / m) } else { Some(0.0) }),
    );

    let atr = wilder_atr(&highs, &lows, &closes, 14);
    put(&mut ind, "atr_14", atr);
    put(
        &mut ind,
        "atr_ratio",
        atr.map(|a| if close != 0.0 { a / close } else { 0.0 }),
    );

    let typical: Vec<f64> = (0..n)
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();
    let keltner_mid = ema_series(&typical, 20)[n - 1];
    let keltner_position = atr.map(|a| {
        let upper = keltner_mid + 2.0 * a;
        let lower = keltner_mid - 2.0 * a;
        if upper - lower > 0.0 {
            ((close - lower) / (upper - lower)).clamp(0.0, 1.0)
        } else {
            0.5
        }
    });
    put(&mut ind, "keltner_position", keltner_position);

    // Volume
    let mut obv = Vec::with_capacity(n);
    obv.push(volumes[0]);
    for i in 1..n {
        let prev = obv[i - 1];
        obv.push(if closes[i] > closes[i - 1] {
            prev + volumes[i]
        } else if closes[i] < closes[i - 1] {
            prev - volumes[i]
        } else {
            prev
        });
    }
    put(&mut ind, "obv", Some(obv[n - 1]));
    put(
        &mut ind,
        "obv_slope",
        if n > 5 { Some(obv[n - 1] - obv[n - 6]) } else { Some(0.0) },
    );

    let cum_vol: f64 = volumes.iter().sum();
    let vwap = if cum_vol > 0.0 {
        typical
            .iter()
            .zip(&volumes)
            .map(|(tp, v)| tp * v)
            .sum::<f64>()
            / cum_vol
    } else {
        close
    };
    put(&mut ind, "vwap", Some(vwap));
    put(&mut ind, "vwap_diff", Some(close - vwap));

    let last_vol = volumes[n - 1];
    let vol_sma20 = sma_last(&volumes, 20);
    put(
        &mut ind,
        "volume_vs_sma20",
        Some(match vol_sma20 {
            Some(avg) if avg > 0.0 => last_vol / avg,
            _ => 1.0,
        }),
    );
    let vol_sma5 = sma_last(&volumes, 5);
    put(
        &mut ind,
        "volume_ratio_5d",
        Some(match vol_sma5 {
            Some(avg) if avg > 0.0 => last_vol / avg,
            _ => 1.0,
        }),
    );

    // Raw OHLCV of the latest bar
    put(&mut ind, "open", Some(opens[n - 1]));
    put(&mut ind, "high", Some(highs[n - 1]));
    put(&mut ind, "low", Some(lows[n - 1]));
    put(&mut ind, "close", Some(close));
    put(&mut ind, "volume", Some(last_vol));

    // Price-based
    let return_1d = pct_change(&closes, 1);
    put(&mut ind, "return_1d", return_1d);
    put(&mut ind, "return_5d", pct_change(&closes, 5));
    put(&mut ind, "return_10d", pct_change(&closes, 10));
    put(&mut ind, "return_20d", pct_change(&closes, 20));
    put(
        &mut ind,
        "high_low_ratio",
        Some(if lows[n - 1] > 0.0 {
            highs[n - 1] / lows[n - 1]
        } else {
            1.0
        }),
    );
    put(
        &mut ind,
        "close_open_ratio",
        Some(if opens[n - 1] > 0.0 { close / opens[n - 1] } else { 1.0 }),
    );
    put(
        &mut ind,
        "price_vs_sma20",
        sma_20.and_then(|s| if s > 0.0 { Some(close / s) } else { None }),
    );
    put(
        &mut ind,
        "price_vs_sma50",
        sma_50.and_then(|s| if s > 0.0 { Some(close / s) } else { None }),
    );
    put(
        &mut ind,
        "price_vs_sma200",
        sma_200.and_then(|s| if s > 0.0 { Some(close / s) } else { None }),
    );
    put(
        &mut ind,
        "gap_percentage",
        if closes[n - 2] != 0.0 {
            Some((opens[n - 1] - closes[n - 2]) / closes[n - 2])
        } else {
            Some(0.0)
        },
    );

    // Cross flags
    put(
        &mut ind,
        "ema12_ema26_cross",
        Some(if ema12[n - 1] > ema26[n - 1] { 1.0 } else { -1.0 }),
    );
    let sma50_or_20 = sma_50.or(sma_20);
    put(
        &mut ind,
        "sma20_sma50_cross",
        match (sma_20, sma50_or_20) {
            (Some(fast), Some(slow)) => Some(if fast > slow { 1.0 } else { -1.0 }),
            _ => None,
        },
    );

    // Composites
    let rsi_val = value(&ind, "rsi_14").unwrap_or(50.0);
    let hist_val = macd - macd_signal;
    put(
        &mut ind,
        "rsi_macd_agreement",
        Some(
            if (rsi_val > 50.0 && hist_val > 0.0) || (rsi_val < 50.0 && hist_val < 0.0) {
                1.0
            } else {
                0.0
            },
        ),
    );
    let vol_vs_sma = value(&ind, "volume_vs_sma20").unwrap_or(1.0);
    put(
        &mut ind,
        "volume_price_confirmation",
        Some(if return_1d.unwrap_or(0.0) > 0.0 && vol_vs_sma > 1.2 {
            1.0
        } else {
            0.0
        }),
    );

    Some(ind)
}

/// Loads history, computes, and persists the latest snapshot.
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub async fn compute_for_symbol(
        conn: &mut SqliteConnection,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Option<IndicatorSet>> {
        let bars = BarRepository::latest(conn, symbol, timeframe, HISTORY_BARS).await?;
        if bars.len() < MIN_BARS {
            warn!(
                "Not enough bars for {} ({}), need {}+",
                symbol,
                bars.len(),
                MIN_BARS
            );
            return Ok(None);
        }

        let Some(values) = compute_all(&bars) else {
            return Ok(None);
        };

        let latest_ts = bars[bars.len() - 1].timestamp;
        IndicatorRepository::upsert(conn, symbol, timeframe, latest_ts, &values).await?;
        debug!(
            "Computed {} indicators for {} ({})",
            values.len(),
            symbol,
            timeframe
        );
        Ok(Some(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Bar {
        Bar {
            symbol: "TEST".to_string(),
            timeframe: "1Day".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(i),
            open,
            high,
            low,
            close,
            volume,
            vwap: None,
            trade_count: None,
        }
    }

    fn trending_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.5;
                bar(i as i64, base, base + 1.0, base - 1.0, base + 0.5, 1_000_000)
            })
            .collect()
    }

    #[test]
    fn test_requires_min_history() {
        assert!(compute_all(&trending_bars(49)).is_none());
        assert!(compute_all(&trending_bars(50)).is_some());
    }

    #[test]
    fn test_deterministic_on_identical_history() {
        let bars = trending_bars(120);
        assert_eq!(compute_all(&bars), compute_all(&bars));
    }

    #[test]
    fn test_uptrend_reads_bullish() {
        let ind = compute_all(&trending_bars(120)).unwrap();
        assert!(value(&ind, "rsi_14").unwrap() > 70.0);
        assert_eq!(value(&ind, "ema12_ema26_cross"), Some(1.0));
        assert_eq!(value(&ind, "sma20_sma50_cross"), Some(1.0));
        assert_eq!(value(&ind, "parabolic_sar_signal"), Some(1.0));
        assert!(value(&ind, "macd_histogram").is_some());
    }

    #[test]
    fn test_sma200_null_for_short_series() {
        let ind = compute_all(&trending_bars(120)).unwrap();
        assert_eq!(ind.get("sma_200"), Some(&None));
        assert_eq!(ind.get("price_vs_sma200"), Some(&None));
        let long = compute_all(&trending_bars(210)).unwrap();
        assert!(value(&long, "sma_200").is_some());
    }

    #[test]
    fn test_bb_position_degenerate_range() {
        // Flat series: zero band width reads as mid position.
        let bars: Vec<Bar> = (0..60)
            .map(|i| bar(i, 100.0, 100.0, 100.0, 100.0, 500_000))
            .collect();
        let ind = compute_all(&bars).unwrap();
        assert_eq!(value(&ind, "bb_position"), Some(0.5));
        assert_eq!(value(&ind, "keltner_position"), Some(0.5));
        assert_eq!(value(&ind, "stoch_k"), Some(50.0));
    }

    #[test]
    fn test_atr_matches_constant_range() {
        // Every bar spans exactly 2.0 with no gaps, so ATR converges to 2.0.
        let bars: Vec<Bar> = (0..80)
            .map(|i| bar(i, 100.0, 101.0, 99.0, 100.0, 500_000))
            .collect();
        let ind = compute_all(&bars).unwrap();
        let atr = value(&ind, "atr_14").unwrap();
        assert!((atr - 2.0).abs() < 1e-9, "got {atr}");
        let ratio = value(&ind, "atr_ratio").unwrap();
        assert!((ratio - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_vwap_equals_typical_price_for_flat_series() {
        let bars: Vec<Bar> = (0..60)
            .map(|i| bar(i, 100.0, 102.0, 98.0, 100.0, 500_000))
            .collect();
        let ind = compute_all(&bars).unwrap();
        let vwap = value(&ind, "vwap").unwrap();
        assert!((vwap - 100.0).abs() < 1e-9);
        assert!((value(&ind, "vwap_diff").unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_returns_and_gap() {
        let mut bars = trending_bars(60);
        let prev_close = bars[58].close;
        bars[59].open = prev_close * 1.02;
        let ind = compute_all(&bars).unwrap();
        let gap = value(&ind, "gap_percentage").unwrap();
        assert!((gap - 0.02).abs() < 1e-9);
        assert!(value(&ind, "return_1d").unwrap() > 0.0);
        assert!(value(&ind, "return_20d").unwrap() > 0.0);
    }

    #[test]
    fn test_obv_slope_five_bar_window() {
        let mut closes_up = trending_bars(60);
        for b in closes_up.iter_mut() {
            b.volume = 10;
        }
        let ind = compute_all(&closes_up).unwrap();
        // Rising closes accumulate +10 per bar, so the 5-bar slope is 50.
        assert_eq!(value(&ind, "obv_slope"), Some(50.0));
    }

    #[test]
    fn test_volume_confirmation_requires_both_legs() {
        let mut bars = trending_bars(60);
        bars[59].volume = 5_000_000; // well above the 20-bar average
        let ind = compute_all(&bars).unwrap();
        assert_eq!(value(&ind, "volume_price_confirmation"), Some(1.0));

        let mut quiet = trending_bars(60);
        quiet[59].volume = 900_000;
        let ind = compute_all(&quiet).unwrap();
        assert_eq!(value(&ind, "volume_price_confirmation"), Some(0.0));
    }

    #[test]
    fn test_adx_high_in_strong_trend() {
        let ind = compute_all(&trending_bars(120)).unwrap();
        let adx = value(&ind, "adx_14").unwrap();
        assert!(adx > 25.0, "strong trend should read ADX > 25, got {adx}");
    }
}
