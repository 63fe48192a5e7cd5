//! Generic time/size-bounded micro-batcher
//!
//! A bounded channel feeds a dedicated worker task that buffers items and
//! hands them to a caller-supplied sink when the buffer reaches `max_items`,
//! when the oldest buffered item has waited `max_wait`, or on drain. The
//! worker awaits the sink inline, so at most one flush per batcher is ever in
//! progress and flushes run in trigger order; items arriving while a flush is
//! under way queue in the channel and form the next batch.

use crate::BoxError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// Destination of a flushed batch. Items arrive in producer push order.
///
/// A failed flush is not retried by the batcher: timer- and size-triggered
/// flush errors are logged and the batch is dropped; drain errors propagate
/// to the drain caller. Sinks that need retries must retry internally with
/// idempotent writes.
#[async_trait]
pub trait BatchSink<T>: Send + Sync {
    async fn flush(&self, items: Vec<T>) -> Result<(), BoxError>;
}

/// Batcher tuning knobs.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Flush as soon as this many items are buffered.
    pub max_items: usize,
    /// Flush once the oldest buffered item has waited this long.
    pub max_wait: Duration,
    /// Capacity of the push channel; pushes beyond it are dropped.
    pub channel_capacity: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_wait: Duration::from_millis(5_000),
            channel_capacity: 10_000,
        }
    }
}

enum Command<T> {
    Item(T),
    Drain(oneshot::Sender<Result<(), BoxError>>),
}

/// Handle to a running batcher worker.
pub struct MicroBatcher<T> {
    name: &'static str,
    tx: mpsc::Sender<Command<T>>,
}

impl<T: Send + 'static> MicroBatcher<T> {
    /// Spawn the worker task and return the push/drain handle.
    pub fn spawn(name: &'static str, config: BatcherConfig, sink: Arc<dyn BatchSink<T>>) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        tokio::spawn(worker(name, config, sink, rx));
        Self { name, tx }
    }

    /// Enqueue an item without blocking the producer.
    ///
    /// If the channel is full the item is dropped with a warning; bounding
    /// memory wins over completeness on the hot path.
    pub fn push(&self, item: T) {
        match self.tx.try_send(Command::Item(item)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("⚠️  {} batcher queue full, dropping item", self.name);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("⚠️  {} batcher worker gone, dropping item", self.name);
            }
        }
    }

    /// Flush everything pushed so far and wait for the flush to finish.
    ///
    /// The drain command queues behind earlier pushes, so every item pushed
    /// before this call is flushed before it returns. The sink outcome of the
    /// final flush is returned to the caller.
    pub async fn drain(&self) -> Result<(), BoxError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Drain(ack_tx))
            .await
            .map_err(|_| format!("{} batcher worker stopped", self.name))?;
        ack_rx
            .await
            .map_err(|_| format!("{} batcher worker dropped drain ack", self.name))?
    }
}

impl<T> Clone for MicroBatcher<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

async fn worker<T: Send + 'static>(
    name: &'static str,
    config: BatcherConfig,
    sink: Arc<dyn BatchSink<T>>,
    mut rx: mpsc::Receiver<Command<T>>,
) {
    let mut pending: Vec<T> = Vec::with_capacity(config.max_items);
    // Set when the first item lands in an empty buffer, cleared on flush.
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Item(item)) => {
                    if pending.is_empty() {
                        deadline = Some(Instant::now() + config.max_wait);
                    }
                    pending.push(item);
                    if pending.len() >= config.max_items {
                        let batch = std::mem::take(&mut pending);
                        deadline = None;
                        if let Err(e) = sink.flush(batch).await {
                            log::warn!("⚠️  {} size-triggered flush failed, batch dropped: {}", name, e);
                        }
                    }
                }
                Some(Command::Drain(ack)) => {
                    let result = if pending.is_empty() {
                        Ok(())
                    } else {
                        let batch = std::mem::take(&mut pending);
                        deadline = None;
                        sink.flush(batch).await
                    };
                    let _ = ack.send(result);
                }
                None => {
                    // All senders dropped: final flush, then stop.
                    if !pending.is_empty() {
                        let batch = std::mem::take(&mut pending);
                        if let Err(e) = sink.flush(batch).await {
                            log::warn!("⚠️  {} final flush failed, batch dropped: {}", name, e);
                        }
                    }
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let batch = std::mem::take(&mut pending);
                deadline = None;
                if let Err(e) = sink.flush(batch).await {
                    log::warn!("⚠️  {} timed flush failed, batch dropped: {}", name, e);
                }
            }
        }
    }

    log::debug!("{} batcher worker stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Sink that records every batch it receives, optionally failing or
    /// stalling to exercise the single-flight path.
    struct RecordingSink {
        batches: Mutex<Vec<Vec<i32>>>,
        fail: AtomicBool,
        delay: Option<Duration>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
                delay: None,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }

        fn batches(&self) -> Vec<Vec<i32>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchSink<i32> for RecordingSink {
        async fn flush(&self, items: Vec<i32>) -> Result<(), BoxError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err("sink unavailable".into());
            }
            self.batches.lock().unwrap().push(items);
            Ok(())
        }
    }

    fn config(max_items: usize, max_wait_ms: u64) -> BatcherConfig {
        BatcherConfig {
            max_items,
            max_wait: Duration::from_millis(max_wait_ms),
            channel_capacity: 100,
        }
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_without_waiting() {
        let sink = Arc::new(RecordingSink::new());
        let batcher = MicroBatcher::spawn("test", config(3, 60_000), sink.clone());

        batcher.push(1);
        batcher.push(2);
        batcher.push(3);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.batches(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_exact_max_items_leaves_empty_buffer() {
        let sink = Arc::new(RecordingSink::new());
        let batcher = MicroBatcher::spawn("test", config(2, 60_000), sink.clone());

        batcher.push(1);
        batcher.push(2);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // One flush with both items; a drain afterwards finds nothing new.
        assert_eq!(sink.batches(), vec![vec![1, 2]]);
        batcher.drain().await.unwrap();
        assert_eq!(sink.batches(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_time_trigger_flushes_partial_batch() {
        let sink = Arc::new(RecordingSink::new());
        let batcher = MicroBatcher::spawn("test", config(100, 50), sink.clone());

        batcher.push(7);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(sink.batches(), vec![vec![7]]);
    }

    #[tokio::test]
    async fn test_drain_flushes_everything_pushed_before_it() {
        let sink = Arc::new(RecordingSink::new());
        let batcher = MicroBatcher::spawn("test", config(100, 60_000), sink.clone());

        for i in 1..=5 {
            batcher.push(i);
        }
        batcher.drain().await.unwrap();

        // Push order preserved within the batch.
        assert_eq!(sink.batches(), vec![vec![1, 2, 3, 4, 5]]);
    }

    #[tokio::test]
    async fn test_drain_on_empty_buffer_is_ok() {
        let sink = Arc::new(RecordingSink::new());
        let batcher = MicroBatcher::spawn("test", config(10, 60_000), sink.clone());

        batcher.drain().await.unwrap();
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn test_drain_propagates_sink_error() {
        let sink = Arc::new(RecordingSink::new());
        sink.fail.store(true, Ordering::SeqCst);
        let batcher = MicroBatcher::spawn("test", config(10, 60_000), sink.clone());

        batcher.push(1);
        let result = batcher.drain().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("sink unavailable"));
    }

    #[tokio::test]
    async fn test_items_pushed_during_flush_form_next_batch() {
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(150)));
        let batcher = MicroBatcher::spawn("test", config(2, 60_000), sink.clone());

        // First pair starts a slow flush; second pair arrives while it runs.
        batcher.push(1);
        batcher.push(2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        batcher.push(3);
        batcher.push(4);

        batcher.drain().await.unwrap();
        assert_eq!(sink.batches(), vec![vec![1, 2], vec![3, 4]]);
    }

    #[tokio::test]
    async fn test_failed_timed_flush_drops_batch_and_recovers() {
        let sink = Arc::new(RecordingSink::new());
        sink.fail.store(true, Ordering::SeqCst);
        let batcher = MicroBatcher::spawn("test", config(100, 50), sink.clone());

        batcher.push(1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.batches().is_empty());

        // Sink comes back; later items flush normally, dropped batch stays dropped.
        sink.fail.store(false, Ordering::SeqCst);
        batcher.push(2);
        batcher.drain().await.unwrap();
        assert_eq!(sink.batches(), vec![vec![2]]);
    }
}
