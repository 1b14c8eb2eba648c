//! The analyst: a language model that reviews every non-HOLD signal
//! before it may reach the risk gate, plus an on-demand deep-analysis
//! path. Any failure degrades to a conservative verdict; the pipeline
//! never stalls on the model.

use crate::application::audit_journal::{AuditEvent, AuditJournal};
use crate::application::coordinator::Coordinator;
use crate::domain::errors::ParseError;
use crate::domain::ports::{ChatModel, ChatRequest};
use crate::domain::types::{NewsArticle, SignalRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::warn;

const REVIEW_SYSTEM_PROMPT: &str = "\
You are the desk's senior equity analyst. You receive machine-generated \
trading signals with supporting data.

Your job:
1. Evaluate the signal quality given current market context
2. Check for risks the model might miss (earnings, news, macro events)
3. Provide a CONFIDENCE ADJUSTMENT (-30 to +20 points)
4. Flag any concerns
5. Suggest position sizing (conservative/normal/aggressive)

RULES:
- Always err on the side of caution
- Flag if earnings are within 5 days
- Flag unusual volume or price action
- Be skeptical of signals during high VIX (>25)
- If unsure, recommend conservative sizing

Respond ONLY in this JSON format (no markdown, no extra text):
{
    \"adjusted_confidence\": <float 0.0-1.0>,
    \"confidence_adjustment\": <int -30 to +20>,
    \"position_sizing\": \"conservative\" | \"normal\" | \"aggressive\",
    \"reasoning\": \"<2-3 sentence explanation>\",
    \"risk_flags\": [\"<flag1>\", \"<flag2>\"],
    \"approve\": true | false
}";

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are the desk's senior equity analyst preparing a standalone outlook \
for one symbol. Weigh trend, momentum, volatility, volume, and the news \
flow, and commit to actionable levels.

Respond ONLY in this JSON format (no markdown, no extra text):
{
    \"direction\": \"bullish\" | \"bearish\" | \"neutral\",
    \"conviction\": <int 1-10>,
    \"timeframe\": \"<expected holding period>\",
    \"entry_zone_low\": <float>,
    \"entry_zone_high\": <float>,
    \"stop_loss\": <float>,
    \"take_profit_1\": <float>,
    \"take_profit_2\": <float>,
    \"risk_reward_ratio\": <float>,
    \"key_support\": [<float>, ...],
    \"key_resistance\": [<float>, ...],
    \"summary\": \"<3-4 sentence thesis>\"
}";

/// Everything the analyst sees about one symbol besides the signal itself.
#[derive(Debug, Clone, Default)]
pub struct SymbolContext {
    pub price: f64,
    pub change_pct: f64,
    pub volume_ratio: f64,
    pub high_52w: f64,
    pub low_52w: f64,
    pub rsi_14: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_position: Option<f64>,
    pub atr_14: Option<f64>,
    pub trend: String,
    pub vix: f64,
    pub spy_change: f64,
    pub sector: String,
    pub recent_news: Vec<NewsArticle>,
    pub upcoming_events: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSizing {
    Conservative,
    Normal,
    Aggressive,
}

impl PositionSizing {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSizing::Conservative => "conservative",
            PositionSizing::Normal => "normal",
            PositionSizing::Aggressive => "aggressive",
        }
    }

    /// Unknown labels read as conservative.
    pub fn parse(s: &str) -> Self {
        match s {
            "normal" => PositionSizing::Normal,
            "aggressive" => PositionSizing::Aggressive,
            _ => PositionSizing::Conservative,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            PositionSizing::Conservative => 0.5,
            PositionSizing::Normal => 1.0,
            PositionSizing::Aggressive => 1.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystReview {
    pub adjusted_confidence: f64,
    pub confidence_adjustment: i32,
    pub position_sizing: PositionSizing,
    pub reasoning: String,
    pub risk_flags: Vec<String>,
    pub approve: bool,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Deep-analysis record for the on-demand path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolAnalysis {
    pub direction: String,
    pub conviction: u8,
    pub timeframe: String,
    pub entry_zone_low: f64,
    pub entry_zone_high: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub risk_reward_ratio: f64,
    pub key_support: Vec<f64>,
    pub key_resistance: Vec<f64>,
    pub summary: String,
}

pub struct Analyst {
    chat: Arc<dyn ChatModel>,
    coordinator: Arc<Coordinator>,
}

impl Analyst {
    pub fn new(chat: Arc<dyn ChatModel>, coordinator: Arc<Coordinator>) -> Self {
        Self { chat, coordinator }
    }

    /// Reviews one signal. Infallible by design: quota, transport, and
    /// parse failures all collapse to a conservative verdict.
    pub async fn review_signal(
        &self,
        conn: &mut SqliteConnection,
        signal: &SignalRecord,
        context: &SymbolContext,
        now: DateTime<Utc>,
    ) -> Result<AnalystReview> {
        let today = now.date_naive();

        let review = if self.coordinator.reviews_exhausted(today) {
            warn!(
                "Analyst review limit reached ({} today)",
                self.coordinator.reviews_used(today)
            );
            AnalystReview {
                adjusted_confidence: signal.confidence * 0.9,
                confidence_adjustment: -10,
                position_sizing: PositionSizing::Conservative,
                reasoning: "Review limit reached, auto-conservative sizing applied.".to_string(),
                risk_flags: vec!["review_limit_reached".to_string()],
                approve: signal.confidence > 0.70,
                input_tokens: 0,
                output_tokens: 0,
            }
        } else {
            let request = ChatRequest {
                system: REVIEW_SYSTEM_PROMPT.to_string(),
                user: Self::build_review_prompt(signal, context),
                max_tokens: 500,
            };
            match self.chat.complete(request).await {
                Ok(reply) => {
                    self.coordinator.record_review(today);
                    let mut review = Self::parse_review(&reply.text, signal);
                    review.input_tokens = reply.input_tokens;
                    review.output_tokens = reply.output_tokens;
                    review
                }
                Err(e) => {
                    warn!("Analyst review failed: {}", e);
                    AnalystReview {
                        adjusted_confidence: signal.confidence * 0.85,
                        confidence_adjustment: -15,
                        position_sizing: PositionSizing::Conservative,
                        reasoning: format!("Analyst call failed ({e}), conservative fallback."),
                        risk_flags: vec!["api_error".to_string()],
                        approve: signal.confidence > 0.72,
                        input_tokens: 0,
                        output_tokens: 0,
                    }
                }
            }
        };

        AuditJournal::append(
            conn,
            AuditEvent::new(
                "analyst_review",
                "analyst",
                json!({
                    "signal_symbol": signal.symbol,
                    "signal_action": signal.action.to_string(),
                    "ml_confidence": signal.confidence,
                    "analyst_approved": review.approve,
                    "adjusted_confidence": review.adjusted_confidence,
                    "position_sizing": review.position_sizing.as_str(),
                    "reasoning": review.reasoning,
                    "risk_flags": review.risk_flags,
                    "tokens": {
                        "input": review.input_tokens,
                        "output": review.output_tokens,
                    },
                    "reviews_today": self.coordinator.reviews_used(today),
                }),
            )
            .symbol(&signal.symbol)
            .chain(signal.decision_chain_id),
        )
        .await?;

        Ok(review)
    }

    fn build_review_prompt(signal: &SignalRecord, ctx: &SymbolContext) -> String {
        let fmt_opt = |v: Option<f64>| match v {
            Some(v) => format!("{v:.4}"),
            None => "N/A".to_string(),
        };
        let news = if ctx.recent_news.is_empty() {
            "No recent news available.".to_string()
        } else {
            ctx.recent_news
                .iter()
                .take(3)
                .map(|n| format!("- {}: {}", n.headline, n.summary))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let events = if ctx.upcoming_events.is_empty() {
            "None known."
        } else {
            ctx.upcoming_events.as_str()
        };

        format!(
            "SIGNAL REVIEW REQUEST:\n\
             Symbol: {} ({})\n\
             Action: {}\n\
             ML Confidence: {:.1}%\n\
             Model Version: {}\n\
             \n\
             PRICE / TREND:\n\
             Price: ${:.2}\n\
             Change Today: {:.2}%\n\
             52w Range: ${:.2} - ${:.2}\n\
             Trend: {}\n\
             \n\
             MOMENTUM:\n\
             RSI(14): {}\n\
             MACD Histogram: {}\n\
             \n\
             VOLATILITY:\n\
             BB Position: {}\n\
             ATR(14): {}\n\
             \n\
             VOLUME:\n\
             Volume vs Avg: {:.1}x\n\
             \n\
             MARKET CONTEXT:\n\
             SPY Today: {:.2}%\n\
             VIX: {:.1}\n\
             \n\
             RECENT NEWS:\n\
             {}\n\
             \n\
             UPCOMING EVENTS:\n\
             {}\n\
             \n\
             Please review and provide your assessment.",
            signal.symbol,
            ctx.sector,
            signal.action,
            signal.confidence * 100.0,
            signal.model_version,
            ctx.price,
            ctx.change_pct * 100.0,
            ctx.low_52w,
            ctx.high_52w,
            ctx.trend,
            fmt_opt(ctx.rsi_14),
            fmt_opt(ctx.macd_histogram),
            fmt_opt(ctx.bb_position),
            fmt_opt(ctx.atr_14),
            ctx.volume_ratio,
            ctx.spy_change * 100.0,
            ctx.vix,
            news,
            events,
        )
    }

    fn try_parse_review(text: &str, signal: &SignalRecord) -> Result<AnalystReview, ParseError> {
        #[derive(Deserialize)]
        struct RawReview {
            adjusted_confidence: Option<f64>,
            confidence_adjustment: Option<i32>,
            position_sizing: Option<String>,
            reasoning: Option<String>,
            risk_flags: Option<Vec<String>>,
            approve: Option<bool>,
        }

        let clean = strip_code_fence(text);
        let raw: RawReview = serde_json::from_str(clean).map_err(|e| ParseError {
            reason: e.to_string(),
        })?;

        Ok(AnalystReview {
            adjusted_confidence: raw
                .adjusted_confidence
                .unwrap_or(signal.confidence)
                .clamp(0.0, 1.0),
            confidence_adjustment: raw.confidence_adjustment.unwrap_or(0).clamp(-30, 20),
            position_sizing: PositionSizing::parse(
                raw.position_sizing.as_deref().unwrap_or("conservative"),
            ),
            reasoning: raw
                .reasoning
                .unwrap_or_else(|| "No reasoning provided.".to_string()),
            risk_flags: raw.risk_flags.unwrap_or_default(),
            approve: raw.approve.unwrap_or(true),
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    fn parse_review(text: &str, signal: &SignalRecord) -> AnalystReview {
        match Self::try_parse_review(text, signal) {
            Ok(review) => review,
            Err(e) => {
                warn!("Failed to parse analyst reply: {}", e);
                let preview: String = text.chars().take(200).collect();
                AnalystReview {
                    adjusted_confidence: signal.confidence * 0.9,
                    confidence_adjustment: -10,
                    position_sizing: PositionSizing::Conservative,
                    reasoning: format!(
                        "Parse error, applying conservative defaults. Raw: {preview}"
                    ),
                    risk_flags: vec!["parse_error".to_string()],
                    approve: signal.confidence > 0.70,
                    input_tokens: 0,
                    output_tokens: 0,
                }
            }
        }
    }

    /// On-demand deep analysis for one symbol. Shares the review quota.
    pub async fn analyze_symbol(
        &self,
        conn: &mut SqliteConnection,
        symbol: &str,
        context: &SymbolContext,
        now: DateTime<Utc>,
    ) -> Result<SymbolAnalysis> {
        let today = now.date_naive();

        let analysis = if self.coordinator.reviews_exhausted(today) {
            Self::fallback_analysis(context, "review budget exhausted")
        } else {
            let request = ChatRequest {
                system: ANALYSIS_SYSTEM_PROMPT.to_string(),
                user: Self::build_analysis_prompt(symbol, context),
                max_tokens: 1000,
            };
            match self.chat.complete(request).await {
                Ok(reply) => {
                    self.coordinator.record_review(today);
                    Self::parse_analysis(&reply.text, context)
                }
                Err(e) => {
                    warn!("Deep analysis failed for {}: {}", symbol, e);
                    Self::fallback_analysis(context, "analyst call failed")
                }
            }
        };

        AuditJournal::append(
            conn,
            AuditEvent::new(
                "symbol_analysis",
                "analyst",
                json!({
                    "symbol": symbol,
                    "direction": analysis.direction,
                    "conviction": analysis.conviction,
                    "risk_reward_ratio": analysis.risk_reward_ratio,
                }),
            )
            .symbol(symbol),
        )
        .await?;

        Ok(analysis)
    }

    fn build_analysis_prompt(symbol: &str, ctx: &SymbolContext) -> String {
        let fmt_opt = |v: Option<f64>| match v {
            Some(v) => format!("{v:.4}"),
            None => "N/A".to_string(),
        };
        let news = if ctx.recent_news.is_empty() {
            "No recent news available.".to_string()
        } else {
            ctx.recent_news
                .iter()
                .take(5)
                .map(|n| format!("- {}: {}", n.headline, n.summary))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "DEEP ANALYSIS REQUEST:\n\
             Symbol: {} ({})\n\
             Price: ${:.2} (today {:+.2}%)\n\
             52w Range: ${:.2} - ${:.2}\n\
             Trend: {}\n\
             RSI(14): {} | MACD Histogram: {} | BB Position: {} | ATR(14): {}\n\
             Volume vs Avg: {:.1}x\n\
             SPY Today: {:+.2}% | VIX: {:.1}\n\
             \n\
             RECENT NEWS:\n\
             {}\n\
             \n\
             Provide your full outlook with entry, stop, and targets.",
            symbol,
            ctx.sector,
            ctx.price,
            ctx.change_pct * 100.0,
            ctx.low_52w,
            ctx.high_52w,
            ctx.trend,
            fmt_opt(ctx.rsi_14),
            fmt_opt(ctx.macd_histogram),
            fmt_opt(ctx.bb_position),
            fmt_opt(ctx.atr_14),
            ctx.volume_ratio,
            ctx.spy_change * 100.0,
            ctx.vix,
            news,
        )
    }

    fn parse_analysis(text: &str, ctx: &SymbolContext) -> SymbolAnalysis {
        let clean = strip_code_fence(text);
        let parsed = serde_json::from_str::<SymbolAnalysis>(clean).map_err(|e| ParseError {
            reason: e.to_string(),
        });
        match parsed {
            Ok(mut analysis) => {
                analysis.conviction = analysis.conviction.clamp(1, 10);
                analysis
            }
            Err(e) => {
                warn!("Failed to parse deep analysis: {}", e);
                Self::fallback_analysis(ctx, "unparseable analyst reply")
            }
        }
    }

    /// Neutral low-conviction outlook with ATR-based default levels.
    fn fallback_analysis(ctx: &SymbolContext, reason: &str) -> SymbolAnalysis {
        let price = ctx.price;
        let atr = ctx.atr_14.filter(|a| *a > 0.0).unwrap_or(price * 0.02);
        SymbolAnalysis {
            direction: "neutral".to_string(),
            conviction: 3,
            timeframe: "2-4 weeks".to_string(),
            entry_zone_low: price - atr,
            entry_zone_high: price,
            stop_loss: price - 2.0 * atr,
            take_profit_1: price + 2.0 * atr,
            take_profit_2: price + 4.0 * atr,
            risk_reward_ratio: 2.0,
            key_support: Vec::new(),
            key_resistance: Vec::new(),
            summary: format!("No analyst view available ({reason}); defaults applied."),
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}
