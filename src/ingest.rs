//! Ingestion boundary between the chain event processor and the batchers
//!
//! The event processor (checkpointing, replay, decoding — out of scope here)
//! publishes one `SwapEvent` per detected swap/provide/withdraw message on a
//! bounded channel. This loop fans each event out to the raw trade batcher
//! and, when the event yielded a price point, to the candle batcher. When the
//! channel closes it drains both batchers so nothing buffered is lost on
//! shutdown.

use crate::batcher::MicroBatcher;
use crate::types::{CandleInput, TradeTick};
use std::time::Instant;
use tokio::sync::mpsc;

/// One decoded chain event as handed over by the event processor.
#[derive(Debug, Clone)]
pub struct SwapEvent {
    pub tick: TradeTick,
    /// Present when the event moved the pool price (swaps do, pure
    /// provide/withdraw events may not).
    pub candle: Option<CandleInput>,
}

/// Consume events until the channel closes, then drain both batchers.
pub async fn run_ingestion(
    mut rx: mpsc::Receiver<SwapEvent>,
    trade_batcher: MicroBatcher<TradeTick>,
    candle_batcher: MicroBatcher<CandleInput>,
) {
    log::info!("🚀 Ingestion loop started");

    let mut event_count = 0u64;
    let mut last_log = Instant::now();

    while let Some(event) = rx.recv().await {
        let SwapEvent { tick, candle } = event;
        trade_batcher.push(tick);
        if let Some(input) = candle {
            candle_batcher.push(input);
        }

        event_count += 1;
        if last_log.elapsed().as_secs() >= 10 {
            let rate = event_count as f64 / last_log.elapsed().as_secs_f64();
            log::info!("📊 Ingestion rate: {:.1} events/sec", rate);
            event_count = 0;
            last_log = Instant::now();
        }
    }

    log::info!("Event channel closed, draining batchers");
    if let Err(e) = trade_batcher.drain().await {
        log::error!("❌ Trade batcher drain failed: {}", e);
    }
    if let Err(e) = candle_batcher.drain().await {
        log::error!("❌ Candle batcher drain failed: {}", e);
    }
    log::info!("✅ Ingestion stopped");
}
