//! Signal scoring: a serialized random-forest classifier when a trained
//! model is on disk, a weighted technical heuristic otherwise.

use crate::application::audit_journal::{AuditEvent, AuditJournal};
use crate::application::features::{FeatureVector, build_features};
use crate::application::indicators::IndicatorSet;
use crate::domain::portfolio::MarketContext;
use crate::domain::types::{SignalRecord, TradeAction};
use crate::infrastructure::persistence::repositories::SignalRepository;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use sqlx::SqliteConnection;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Signals below this confidence are never persisted.
pub const MIN_CONFIDENCE: f64 = 0.65;

/// The serialized model regresses a direction score in [0, 1], trained
/// with SELL = 0.0, HOLD = 0.5, BUY = 1.0 targets.
type Classifier = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Projects the direction score onto (BUY, HOLD, SELL) probabilities.
fn class_distribution(score: f64) -> (f64, f64, f64) {
    let score = score.clamp(0.0, 1.0);
    let p_buy = ((score - 0.5) * 2.0).clamp(0.0, 1.0);
    let p_sell = ((0.5 - score) * 2.0).clamp(0.0, 1.0);
    (p_buy, 1.0 - p_buy - p_sell, p_sell)
}

/// The class with the largest probability, demoted to HOLD when it does
/// not clear the confidence floor.
fn decide(p_buy: f64, p_hold: f64, p_sell: f64) -> (TradeAction, f64) {
    let (action, p) = if p_buy >= p_hold && p_buy >= p_sell {
        (TradeAction::Buy, p_buy)
    } else if p_sell >= p_hold {
        (TradeAction::Sell, p_sell)
    } else {
        (TradeAction::Hold, p_hold)
    };
    if action != TradeAction::Hold && p < MIN_CONFIDENCE {
        (TradeAction::Hold, p_hold)
    } else {
        (action, p)
    }
}

pub struct SignalEngine {
    model: Option<Classifier>,
    model_version: String,
}

impl SignalEngine {
    pub fn new(model_path: &Path) -> Self {
        let (model, model_version) = Self::load_model(model_path);
        Self {
            model,
            model_version,
        }
    }

    /// Forces the heuristic path; used when no model directory is configured.
    pub fn heuristic_only() -> Self {
        Self {
            model: None,
            model_version: "v0.0.0".to_string(),
        }
    }

    fn load_model(model_path: &Path) -> (Option<Classifier>, String) {
        if !model_path.exists() {
            warn!(
                "No trained model found at {:?}, using heuristic fallback",
                model_path
            );
            return (None, "v0.0.0".to_string());
        }

        let model = File::open(model_path)
            .map_err(|e| e.to_string())
            .and_then(|mut file| {
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer).map_err(|e| e.to_string())?;
                serde_json::from_slice::<Classifier>(&buffer).map_err(|e| e.to_string())
            });

        match model {
            Ok(model) => {
                let version = Self::read_version(model_path);
                info!("Loaded model {} from {:?}", version, model_path);
                (Some(model), version)
            }
            Err(e) => {
                error!("Failed to load model from {:?}: {}", model_path, e);
                (None, "v0.0.0".to_string())
            }
        }
    }

    fn read_version(model_path: &Path) -> String {
        let version_path: PathBuf = model_path.with_file_name("latest_version.txt");
        std::fs::read_to_string(version_path)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "v0.0.0".to_string())
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Scores one symbol and persists the signal when it clears the
    /// confidence floor and is not a HOLD.
    pub async fn generate_signal(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
        indicators: &IndicatorSet,
        market_context: &MarketContext,
        now: DateTime<Utc>,
    ) -> Result<Option<(SignalRecord, FeatureVector)>> {
        let Some(features) = build_features(indicators, market_context) else {
            warn!("No features computed for {}", symbol);
            return Ok(None);
        };

        let (action, confidence) = self.predict(&features);

        if action == TradeAction::Hold || confidence < MIN_CONFIDENCE {
            debug!(
                "Signal for {} below threshold: {} {:.1}% (min: {:.1}%)",
                symbol,
                action,
                confidence * 100.0,
                MIN_CONFIDENCE * 100.0
            );
            return Ok(None);
        }

        let mut signal = SignalRecord::new(
            symbol,
            action,
            confidence,
            &self.model_version,
            features.to_json(),
            now,
        );
        signal.id = SignalRepository::insert(conn, &signal).await?;

        let top: serde_json::Map<String, serde_json::Value> = features
            .top_by_magnitude(5)
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();
        AuditJournal::append(
            conn,
            AuditEvent::new(
                "signal_generated",
                "signal_engine",
                json!({
                    "symbol": symbol,
                    "action": action.to_string(),
                    "confidence": confidence,
                    "model_version": self.model_version,
                    "top_features": top,
                }),
            )
            .symbol(symbol)
            .chain(signal.decision_chain_id),
        )
        .await?;

        info!(
            "Signal: {} {} (confidence: {:.1}%)",
            action,
            symbol,
            confidence * 100.0
        );
        Ok(Some((signal, features)))
    }

    pub fn predict(&self, features: &FeatureVector) -> (TradeAction, f64) {
        match &self.model {
            Some(model) => self.predict_model(model, features),
            None => Self::predict_heuristic(features),
        }
    }

    fn predict_model(&self, model: &Classifier, features: &FeatureVector) -> (TradeAction, f64) {
        let row = features.to_ordered_vec();
        let matrix = match DenseMatrix::from_2d_vec(&vec![row]) {
            Ok(m) => m,
            Err(e) => {
                error!("Model input matrix failed: {}, using heuristic", e);
                return Self::predict_heuristic(features);
            }
        };

        match model.predict(&matrix) {
            Ok(scores) => {
                let score = scores.first().copied().unwrap_or(0.5);
                let (p_buy, p_hold, p_sell) = class_distribution(score);
                decide(p_buy, p_hold, p_sell)
            }
            Err(e) => {
                error!("Model prediction failed: {}, using heuristic", e);
                Self::predict_heuristic(features)
            }
        }
    }

    /// Weighted combination of technical signals, normalized to [-1, 1].
    pub fn predict_heuristic(features: &FeatureVector) -> (TradeAction, f64) {
        let mut score = 0.0;
        let mut weights_total = 0.0;

        let rsi = features.get("rsi_14");
        if rsi < 30.0 {
            score += 2.0;
        } else if rsi > 70.0 {
            score -= 2.0;
        } else if rsi < 45.0 {
            score += 0.5;
        } else if rsi > 55.0 {
            score -= 0.5;
        }
        weights_total += 2.0;

        let macd_hist = features.get("macd_histogram");
        score += if macd_hist > 0.0 { 1.0 } else { -1.0 };
        weights_total += 1.0;

        score += features.get("trend_alignment_score") * 2.0;
        weights_total += 2.0;

        score += features.get("volume_price_confirmation");
        weights_total += 1.0;

        let bb_pos = features.get("bb_position");
        if bb_pos < 0.2 {
            score += 1.5;
        } else if bb_pos > 0.8 {
            score -= 1.5;
        }
        weights_total += 1.5;

        let normalized = if weights_total > 0.0 {
            score / weights_total
        } else {
            0.0
        };

        if normalized > 0.3 {
            (TradeAction::Buy, (0.5 + normalized * 0.3).min(0.85))
        } else if normalized < -0.3 {
            (TradeAction::Sell, (0.5 + normalized.abs() * 0.3).min(0.85))
        } else {
            (TradeAction::Hold, 0.5 + (1.0 - normalized.abs()) * 0.2)
        }
    }
}
