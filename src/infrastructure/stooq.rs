//! Free daily-bar fallback. Stooq serves end-of-day history as CSV with
//! no auth, which covers primary-feed outages for the 1Day timeframe.

use crate::domain::errors::TransportError;
use crate::domain::types::Bar;
use crate::infrastructure::http::build_client;
use chrono::NaiveDate;
use reqwest_middleware::ClientWithMiddleware;
use tracing::debug;

const SERVICE: &str = "stooq";

pub struct StooqClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl StooqClient {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_base_url("https://stooq.com".to_string())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(SERVICE)?,
            base_url,
        })
    }

    /// The most recent `limit` daily bars for a US-listed symbol, oldest
    /// first.
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, TransportError> {
        let url = format!(
            "{}/q/d/l/?s={}.us&i=d",
            self.base_url,
            symbol.to_lowercase()
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| TransportError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;
        let bars = parse_stooq_csv(symbol, &body)?;
        debug!("Stooq returned {} daily bars for {}", bars.len(), symbol);
        let start = bars.len().saturating_sub(limit);
        Ok(bars[start..].to_vec())
    }
}

/// Columns: Date,Open,High,Low,Close,Volume. Unparseable rows are skipped.
fn parse_stooq_csv(symbol: &str, body: &str) -> Result<Vec<Bar>, TransportError> {
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut bars = Vec::new();

    for record in reader.records() {
        let record = record.map_err(|e| TransportError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })?;
        let Some(date) = record
            .get(0)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let field = |i: usize| record.get(i).and_then(|v| v.parse::<f64>().ok());
        let (Some(open), Some(high), Some(low), Some(close)) =
            (field(1), field(2), field(3), field(4))
        else {
            continue;
        };
        let volume = field(5).unwrap_or(0.0) as i64;

        bars.push(Bar {
            symbol: symbol.to_string(),
            timeframe: "1Day".to_string(),
            timestamp: date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).unwrap(),
            open,
            high,
            low,
            close,
            volume,
            vwap: None,
            trade_count: None,
        });
    }

    Ok(bars)
}
