//! ZigFlow — real-time DEX swap indexer
//!
//! Ingests on-chain swap/provide/withdraw events and maintains derived read
//! models: an append-only raw trade log, per-minute OHLCV candles with
//! cross-batch continuity, and canonical price/pool selection for downstream
//! consumers.
//!
//! Write path: event processor → [`ingest::run_ingestion`] →
//! [`batcher::MicroBatcher`] instances → [`trades::TradeSink`] /
//! [`candles::CandleAggregator`] → [`db::Database`]. Read path:
//! [`selector`] resolves pools/prices and percent change on demand.

pub mod batcher;
pub mod candles;
pub mod config;
pub mod db;
pub mod ingest;
pub mod selector;
pub mod trades;
pub mod types;

pub use batcher::{BatchSink, BatcherConfig, MicroBatcher};
pub use candles::CandleAggregator;
pub use config::Config;
pub use db::Database;
pub use ingest::{run_ingestion, SwapEvent};
pub use selector::{best_uzig_pool, change_pct, select_price_pool, PricePolicy, SelectedPool};
pub use trades::TradeSink;
pub use types::{Candle, CandleInput, Pool, PoolMetric, PriceRow, TradeAction, TradeDirection, TradeTick};

/// Error type used across the crate; concrete causes are wrapped rather than
/// enumerated.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
