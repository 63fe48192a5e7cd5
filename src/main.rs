use std::sync::Arc;
use tokio::sync::mpsc;
use zigflow::{
    run_ingestion, BoxError, CandleAggregator, Config, Database, MicroBatcher, SwapEvent,
    TradeSink,
};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!("🚀 Starting ZigFlow...");
    log::info!("📊 Configuration:");
    log::info!("   DB path: {}", config.db_path);
    log::info!(
        "   Trade batch: {} items / {:?}",
        config.trade_batch.max_items,
        config.trade_batch.max_wait
    );
    log::info!(
        "   Candle batch: {} items / {:?}",
        config.candle_batch.max_items,
        config.candle_batch.max_wait
    );

    let db = Arc::new(Database::open(&config.db_path)?);

    let trade_batcher = MicroBatcher::spawn(
        "trades",
        config.trade_batch.clone(),
        Arc::new(TradeSink::new(db.clone())),
    );
    let candle_batcher = MicroBatcher::spawn(
        "candles",
        config.candle_batch.clone(),
        Arc::new(CandleAggregator::new(db.clone())),
    );

    // The chain event processor publishes decoded events through this
    // channel; closing it is the shutdown signal for the ingestion loop.
    let (event_tx, event_rx) = mpsc::channel::<SwapEvent>(config.channel_buffer);
    let ingestion = tokio::spawn(run_ingestion(event_rx, trade_batcher, candle_batcher));

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown requested, flushing buffered data...");

    drop(event_tx);
    ingestion.await?;

    log::info!("✅ ZigFlow stopped");
    Ok(())
}
