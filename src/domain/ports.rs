use crate::domain::errors::TransportError;
use crate::domain::portfolio::{Account, Position};
use crate::domain::types::{Bar, BracketOrder, NewsArticle, PlacedOrder};
use async_trait::async_trait;

/// Thin typed surface over the brokerage REST API.
#[async_trait]
pub trait Brokerage: Send + Sync {
    async fn get_account(&self) -> Result<Account, TransportError>;
    async fn get_positions(&self) -> Result<Vec<Position>, TransportError>;
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, TransportError>;
    async fn get_latest_trade(&self, symbol: &str) -> Result<f64, TransportError>;
    async fn get_news(
        &self,
        symbols: &[String],
        limit: usize,
    ) -> Result<Vec<NewsArticle>, TransportError>;
    async fn place_bracket_order(&self, order: &BracketOrder)
    -> Result<PlacedOrder, TransportError>;
    /// Cancels all open orders; returns how many were affected.
    async fn cancel_all_orders(&self) -> Result<usize, TransportError>;
    /// Closes all open positions (cancelling linked orders); returns how
    /// many were affected.
    async fn close_all_positions(&self) -> Result<usize, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The language model behind the analyst.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, TransportError>;
}
