//! Alpaca REST client: trading API for account, positions, and orders;
//! data API for bars, latest trades, and news. Auth is header-based; all
//! numeric payload fields arrive as strings and are parsed here.

use crate::domain::errors::TransportError;
use crate::domain::portfolio::{Account, Position};
use crate::domain::ports::Brokerage;
use crate::domain::types::{Bar, BracketOrder, NewsArticle, PlacedOrder};
use crate::infrastructure::http::{build_client, url_with_params};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

const SERVICE: &str = "alpaca";

pub struct AlpacaClient {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    base_url: String,
    data_url: String,
}

impl AlpacaClient {
    pub fn new(
        api_key: String,
        api_secret: String,
        base_url: String,
        data_url: String,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(SERVICE)?,
            api_key,
            api_secret,
            base_url,
            data_url,
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: impl reqwest::IntoUrl,
    ) -> reqwest_middleware::RequestBuilder {
        self.client
            .request(method, url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    async fn check(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            service: SERVICE,
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: impl reqwest::IntoUrl + Send,
    ) -> Result<T, TransportError> {
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        Self::check(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            })
    }

    fn parse_f64(raw: &str) -> f64 {
        raw.parse::<f64>().unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
struct AlpacaAccount {
    equity: String,
    last_equity: String,
    cash: String,
    #[serde(default)]
    long_market_value: String,
    #[serde(default)]
    short_market_value: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaPosition {
    symbol: String,
    qty: String,
    side: String,
    avg_entry_price: String,
    #[serde(default)]
    current_price: Option<String>,
    #[serde(default)]
    market_value: Option<String>,
    #[serde(default)]
    unrealized_pl: Option<String>,
    #[serde(default)]
    unrealized_plpc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    vw: Option<f64>,
    #[serde(default)]
    n: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBarsResponse {
    #[serde(default)]
    bars: Vec<AlpacaBar>,
}

#[derive(Debug, Deserialize)]
struct AlpacaLatestTrade {
    trade: AlpacaTradePrice,
}

#[derive(Debug, Deserialize)]
struct AlpacaTradePrice {
    p: f64,
}

#[derive(Debug, Deserialize)]
struct AlpacaNewsResponse {
    #[serde(default)]
    news: Vec<AlpacaNewsArticle>,
}

#[derive(Debug, Deserialize)]
struct AlpacaNewsArticle {
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    source: String,
    created_at: String,
    #[serde(default)]
    symbols: Vec<String>,
    #[serde(default)]
    url: String,
}

/// Bit-exact bracket order payload for POST /v2/orders.
#[derive(Debug, Serialize)]
struct AlpacaBracketRequest {
    symbol: String,
    qty: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    limit_price: String,
    time_in_force: String,
    order_class: String,
    stop_loss: AlpacaStopLoss,
    take_profit: AlpacaTakeProfit,
}

#[derive(Debug, Serialize)]
struct AlpacaStopLoss {
    stop_price: String,
}

#[derive(Debug, Serialize)]
struct AlpacaTakeProfit {
    limit_price: String,
}

fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

#[async_trait]
impl Brokerage for AlpacaClient {
    async fn get_account(&self) -> Result<Account, TransportError> {
        let url = format!("{}/v2/account", self.base_url);
        let raw: AlpacaAccount = self.get_json(&url).await?;
        Ok(Account {
            equity: Self::parse_f64(&raw.equity),
            last_equity: Self::parse_f64(&raw.last_equity),
            cash: Self::parse_f64(&raw.cash),
            long_market_value: Self::parse_f64(&raw.long_market_value),
            short_market_value: Self::parse_f64(&raw.short_market_value),
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>, TransportError> {
        let url = format!("{}/v2/positions", self.base_url);
        let raw: Vec<AlpacaPosition> = self.get_json(&url).await?;
        Ok(raw
            .into_iter()
            .map(|p| Position {
                shares: Self::parse_f64(&p.qty) as i64,
                side: p.side,
                entry_price: Self::parse_f64(&p.avg_entry_price),
                current_price: p.current_price.as_deref().map(Self::parse_f64).unwrap_or(0.0),
                market_value: p.market_value.as_deref().map(Self::parse_f64).unwrap_or(0.0),
                unrealized_pnl: p.unrealized_pl.as_deref().map(Self::parse_f64).unwrap_or(0.0),
                unrealized_pnl_pct: p
                    .unrealized_plpc
                    .as_deref()
                    .map(Self::parse_f64)
                    .unwrap_or(0.0)
                    * 100.0,
                symbol: p.symbol,
            })
            .collect())
    }

    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, TransportError> {
        let limit_str = limit.to_string();
        let url = url_with_params(
            &format!("{}/v2/stocks/{}/bars", self.data_url, symbol),
            [
                ("timeframe", timeframe),
                ("limit", limit_str.as_str()),
                ("adjustment", "raw"),
                ("feed", "iex"),
            ],
        )?;
        let raw: AlpacaBarsResponse = self.get_json(url).await?;
        Ok(raw
            .bars
            .into_iter()
            .map(|b| Bar {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                timestamp: b.t,
                open: b.o,
                high: b.h,
                low: b.l,
                close: b.c,
                volume: b.v as i64,
                vwap: b.vw,
                trade_count: b.n,
            })
            .collect())
    }

    async fn get_latest_trade(&self, symbol: &str) -> Result<f64, TransportError> {
        let url = url_with_params(
            &format!("{}/v2/stocks/{}/trades/latest", self.data_url, symbol),
            [("feed", "iex")],
        )?;
        let raw: AlpacaLatestTrade = self.get_json(url).await?;
        Ok(raw.trade.p)
    }

    async fn get_news(
        &self,
        symbols: &[String],
        limit: usize,
    ) -> Result<Vec<NewsArticle>, TransportError> {
        let symbols_param = symbols.join(",");
        let limit_str = limit.to_string();
        let url = url_with_params(
            &format!("{}/v1beta1/news", self.data_url),
            [
                ("symbols", symbols_param.as_str()),
                ("limit", limit_str.as_str()),
                ("sort", "desc"),
            ],
        )?;
        let raw: AlpacaNewsResponse = self.get_json(url).await?;
        Ok(raw
            .news
            .into_iter()
            .map(|n| NewsArticle {
                headline: n.headline,
                summary: n.summary,
                source: n.source,
                created_at: n.created_at,
                symbols: n.symbols,
                url: n.url,
            })
            .collect())
    }

    async fn place_bracket_order(
        &self,
        order: &BracketOrder,
    ) -> Result<PlacedOrder, TransportError> {
        let payload = AlpacaBracketRequest {
            symbol: order.symbol.clone(),
            qty: order.qty.to_string(),
            side: order.side.as_str().to_string(),
            order_type: "limit".to_string(),
            limit_price: format_price(order.limit_price),
            time_in_force: "day".to_string(),
            order_class: "bracket".to_string(),
            stop_loss: AlpacaStopLoss {
                stop_price: format_price(order.stop_price),
            },
            take_profit: AlpacaTakeProfit {
                limit_price: format_price(order.target_price),
            },
        };

        let url = format!("{}/v2/orders", self.base_url);
        let body = serde_json::to_string(&payload).map_err(|e| TransportError::Request {
            service: SERVICE,
            reason: e.to_string(),
        })?;
        let response = self
            .request(reqwest::Method::POST, &url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        let placed: PlacedOrder = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Decode {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        info!("Alpaca order placed: {} (status: {})", placed.id, placed.status);
        Ok(placed)
    }

    async fn cancel_all_orders(&self) -> Result<usize, TransportError> {
        let url = format!("{}/v2/orders", self.base_url);
        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        let cancelled: Value = Self::check(response)
            .await?
            .json()
            .await
            .unwrap_or(Value::Null);
        Ok(cancelled.as_array().map(|a| a.len()).unwrap_or(0))
    }

    async fn close_all_positions(&self) -> Result<usize, TransportError> {
        let url = url_with_params(
            &format!("{}/v2/positions", self.base_url),
            [("cancel_orders", "true")],
        )?;
        let response = self
            .request(reqwest::Method::DELETE, url)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        let closed: Value = Self::check(response)
            .await?
            .json()
            .await
            .unwrap_or(Value::Null);
        Ok(closed.as_array().map(|a| a.len()).unwrap_or(0))
    }
}
