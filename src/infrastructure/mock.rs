//! Scripted in-memory services for tests: a broker with settable account,
//! position, bar, and news state, and a chat model that replays canned
//! replies or fails on demand.

use crate::domain::errors::TransportError;
use crate::domain::portfolio::{Account, Position};
use crate::domain::ports::{Brokerage, ChatModel, ChatReply, ChatRequest};
use crate::domain::types::{Bar, BracketOrder, NewsArticle, PlacedOrder};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

fn unavailable(service: &'static str) -> TransportError {
    TransportError::Request {
        service,
        reason: "scripted failure".to_string(),
    }
}

#[derive(Default)]
struct MockBrokerState {
    account: Option<Account>,
    positions: Vec<Position>,
    bars: HashMap<String, Vec<Bar>>,
    news: Vec<NewsArticle>,
    latest_trades: HashMap<String, f64>,
    placed_orders: Vec<BracketOrder>,
    fail_bars: bool,
    fail_orders: bool,
    open_order_count: usize,
}

pub struct MockBrokerage {
    state: Mutex<MockBrokerState>,
    order_seq: AtomicUsize,
}

impl MockBrokerage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockBrokerState::default()),
            order_seq: AtomicUsize::new(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockBrokerState> {
        self.state.lock().expect("mock broker state poisoned")
    }

    pub fn set_account(&self, equity: f64, last_equity: f64, cash: f64, long_value: f64) {
        self.lock().account = Some(Account {
            equity,
            last_equity,
            cash,
            long_market_value: long_value,
            short_market_value: 0.0,
        });
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        self.lock().positions = positions;
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<Bar>) {
        self.lock().bars.insert(symbol.to_string(), bars);
    }

    pub fn set_news(&self, news: Vec<NewsArticle>) {
        self.lock().news = news;
    }

    pub fn set_latest_trade(&self, symbol: &str, price: f64) {
        self.lock().latest_trades.insert(symbol.to_string(), price);
    }

    pub fn set_fail_bars(&self, fail: bool) {
        self.lock().fail_bars = fail;
    }

    pub fn set_fail_orders(&self, fail: bool) {
        self.lock().fail_orders = fail;
    }

    pub fn set_open_order_count(&self, count: usize) {
        self.lock().open_order_count = count;
    }

    pub fn placed_orders(&self) -> Vec<BracketOrder> {
        self.lock().placed_orders.clone()
    }
}

impl Default for MockBrokerage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Brokerage for MockBrokerage {
    async fn get_account(&self) -> Result<Account, TransportError> {
        self.lock()
            .account
            .clone()
            .ok_or_else(|| unavailable("mock-broker"))
    }

    async fn get_positions(&self) -> Result<Vec<Position>, TransportError> {
        Ok(self.lock().positions.clone())
    }

    async fn get_bars(
        &self,
        symbol: &str,
        _timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>, TransportError> {
        let state = self.lock();
        if state.fail_bars {
            return Err(unavailable("mock-broker"));
        }
        let bars = state.bars.get(symbol).cloned().unwrap_or_default();
        let start = bars.len().saturating_sub(limit);
        Ok(bars[start..].to_vec())
    }

    async fn get_latest_trade(&self, symbol: &str) -> Result<f64, TransportError> {
        self.lock()
            .latest_trades
            .get(symbol)
            .copied()
            .ok_or_else(|| unavailable("mock-broker"))
    }

    async fn get_news(
        &self,
        _symbols: &[String],
        limit: usize,
    ) -> Result<Vec<NewsArticle>, TransportError> {
        let news = self.lock().news.clone();
        Ok(news.into_iter().take(limit).collect())
    }

    async fn place_bracket_order(
        &self,
        order: &BracketOrder,
    ) -> Result<PlacedOrder, TransportError> {
        let mut state = self.lock();
        if state.fail_orders {
            return Err(TransportError::Status {
                service: "mock-broker",
                status: 422,
                body: "scripted order rejection".to_string(),
            });
        }
        state.placed_orders.push(order.clone());
        let seq = self.order_seq.fetch_add(1, Ordering::Relaxed);
        Ok(PlacedOrder {
            id: format!("mock-order-{seq}"),
            status: "accepted".to_string(),
        })
    }

    async fn cancel_all_orders(&self) -> Result<usize, TransportError> {
        let mut state = self.lock();
        let count = state.open_order_count + state.placed_orders.len();
        state.open_order_count = 0;
        state.placed_orders.clear();
        Ok(count)
    }

    async fn close_all_positions(&self) -> Result<usize, TransportError> {
        let mut state = self.lock();
        let count = state.positions.len();
        state.positions.clear();
        Ok(count)
    }
}

enum ScriptedReply {
    Text(String),
    Failure,
}

pub struct MockChatModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, text: &str) {
        self.replies
            .lock()
            .expect("mock chat replies poisoned")
            .push_back(ScriptedReply::Text(text.to_string()));
    }

    pub fn push_failure(&self) {
        self.replies
            .lock()
            .expect("mock chat replies poisoned")
            .push_back(ScriptedReply::Failure);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("mock chat requests poisoned").len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests
            .lock()
            .expect("mock chat requests poisoned")
            .last()
            .cloned()
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, TransportError> {
        self.requests
            .lock()
            .expect("mock chat requests poisoned")
            .push(request);
        let next = self
            .replies
            .lock()
            .expect("mock chat replies poisoned")
            .pop_front();
        match next {
            Some(ScriptedReply::Text(text)) => Ok(ChatReply {
                input_tokens: 250,
                output_tokens: 120,
                text,
            }),
            Some(ScriptedReply::Failure) | None => Err(unavailable("mock-chat")),
        }
    }
}
