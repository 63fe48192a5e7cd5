//! Runtime configuration from environment variables

use crate::batcher::BatcherConfig;
use std::env;
use std::time::Duration;

/// Indexer configuration, loaded from the environment with defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: String,

    /// Capacity of the ingestion event channel.
    pub channel_buffer: usize,

    /// Batching for raw trade appends.
    pub trade_batch: BatcherConfig,

    /// Batching for candle aggregation.
    pub candle_batch: BatcherConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Recognized variables:
    /// - `ZIGFLOW_DB_PATH` (default: zigflow.db)
    /// - `INGEST_CHANNEL_BUFFER` (default: 10000)
    /// - `TRADE_BATCH_MAX_ITEMS` (default: 100)
    /// - `TRADE_BATCH_MAX_WAIT_MS` (default: 5000)
    /// - `CANDLE_BATCH_MAX_ITEMS` (default: 100)
    /// - `CANDLE_BATCH_MAX_WAIT_MS` (default: 5000)
    pub fn from_env() -> Self {
        let channel_buffer = parsed("INGEST_CHANNEL_BUFFER", 10_000usize);
        Self {
            db_path: env::var("ZIGFLOW_DB_PATH").unwrap_or_else(|_| "zigflow.db".to_string()),
            channel_buffer,
            trade_batch: BatcherConfig {
                max_items: parsed("TRADE_BATCH_MAX_ITEMS", 100),
                max_wait: Duration::from_millis(parsed("TRADE_BATCH_MAX_WAIT_MS", 5_000)),
                channel_capacity: channel_buffer,
            },
            candle_batch: BatcherConfig {
                max_items: parsed("CANDLE_BATCH_MAX_ITEMS", 100),
                max_wait: Duration::from_millis(parsed("CANDLE_BATCH_MAX_WAIT_MS", 5_000)),
                channel_capacity: channel_buffer,
            },
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global, so overrides and defaults share one test.
    #[test]
    fn test_from_env_overrides_and_defaults() {
        env::set_var("ZIGFLOW_DB_PATH", "/tmp/zigflow-test.db");
        env::set_var("TRADE_BATCH_MAX_ITEMS", "250");
        env::set_var("CANDLE_BATCH_MAX_WAIT_MS", "750");

        let config = Config::from_env();
        assert_eq!(config.db_path, "/tmp/zigflow-test.db");
        assert_eq!(config.trade_batch.max_items, 250);
        assert_eq!(config.candle_batch.max_wait, Duration::from_millis(750));
        // Unset variables fall back to defaults.
        assert_eq!(config.candle_batch.max_items, 100);
        assert_eq!(config.channel_buffer, 10_000);

        env::remove_var("ZIGFLOW_DB_PATH");
        env::remove_var("TRADE_BATCH_MAX_ITEMS");
        env::remove_var("CANDLE_BATCH_MAX_WAIT_MS");

        let config = Config::from_env();
        assert_eq!(config.db_path, "zigflow.db");
        assert_eq!(config.trade_batch.max_items, 100);
        assert_eq!(config.candle_batch.max_wait, Duration::from_millis(5_000));
    }
}
