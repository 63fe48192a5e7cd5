//! OHLCV candle aggregation
//!
//! Flush sink for the candle batcher: reduces a batch of price points into
//! one row per (pool, minute bucket) and appends them in bulk. A per-pool
//! continuity cache chains each new candle's open onto the pool's last known
//! close so the series has no artificial gaps between buckets. The cache is
//! process-local and rebuilds from the first observed price after a restart.

use crate::batcher::BatchSink;
use crate::db::Database;
use crate::types::{quantize_amount, quantize_price, Candle, CandleInput};
use crate::BoxError;
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
struct LastClose {
    bucket_start: i64,
    close: f64,
}

/// Reduces candle inputs and persists the result.
///
/// The continuity cache is owned by the aggregator instance and only touched
/// inside `flush`; the batcher's single-flight worker is its sole caller, so
/// no other task ever observes it mid-update.
pub struct CandleAggregator {
    db: Arc<Database>,
    continuity: Mutex<HashMap<i64, LastClose>>,
}

impl CandleAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            continuity: Mutex::new(HashMap::new()),
        }
    }

    /// Collapse a batch into one candle per (pool, bucket) and apply the
    /// continuity pass.
    ///
    /// Close is last-by-batch-arrival: push order at the batcher, which is
    /// arrival order at the event processor. High/low/volume/count are order
    /// insensitive.
    fn reduce(&self, inputs: Vec<CandleInput>) -> Vec<Candle> {
        let mut grouped: HashMap<(i64, i64), Candle> = HashMap::new();

        for input in inputs {
            let price = quantize_price(input.price);
            let volume = quantize_amount(input.volume);
            let liquidity = input.liquidity.map(quantize_amount);

            match grouped.entry((input.pool_id, input.bucket_start)) {
                Entry::Occupied(mut entry) => {
                    let candle = entry.get_mut();
                    candle.high = candle.high.max(price);
                    candle.low = candle.low.min(price);
                    candle.close = price;
                    candle.volume = quantize_amount(candle.volume + volume);
                    candle.trade_count += input.trade_count;
                    if liquidity.is_some() {
                        candle.liquidity = liquidity;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(Candle {
                        pool_id: input.pool_id,
                        bucket_start: input.bucket_start,
                        open: price,
                        high: price,
                        low: price,
                        close: price,
                        volume,
                        trade_count: input.trade_count,
                        liquidity,
                    });
                }
            }
        }

        let mut rows: Vec<Candle> = grouped.into_values().collect();
        rows.sort_by_key(|c| (c.pool_id, c.bucket_start));

        let mut cache = self.continuity.lock().unwrap();
        for row in &mut rows {
            let prior = cache.get(&row.pool_id).copied();
            if let Some(last) = prior {
                if last.bucket_start < row.bucket_start {
                    // Chain onto the previous close. High/low keep the
                    // observed extremes, so open may land outside [low, high];
                    // that is accepted for a chained candle.
                    row.open = last.close;
                } else if last.bucket_start > row.bucket_start {
                    // Late flush of an older bucket never rewinds the cache.
                    continue;
                }
                // Equal bucket: same bucket re-flushed, refresh the close below.
            }
            cache.insert(
                row.pool_id,
                LastClose {
                    bucket_start: row.bucket_start,
                    close: row.close,
                },
            );
        }

        rows
    }
}

#[async_trait]
impl BatchSink<CandleInput> for CandleAggregator {
    async fn flush(&self, items: Vec<CandleInput>) -> Result<(), BoxError> {
        let input_count = items.len();
        let rows = self.reduce(items);
        if rows.is_empty() {
            return Ok(());
        }
        self.db.insert_candles(&rows)?;
        log::debug!("🕯️  {} inputs reduced to {} candles", input_count, rows.len());
        Ok(())
    }
}
