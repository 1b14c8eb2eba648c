pub mod alpaca;
pub mod anthropic;
pub mod http;
pub mod mock;
pub mod persistence;
pub mod stooq;
