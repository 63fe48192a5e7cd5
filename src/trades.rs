//! Raw trade persistence
//!
//! Flush sink for the trade batcher: a straight bulk append, no aggregation.
//! Partial chain data never blocks ingestion; optional fields the event
//! processor could not decode are coerced to defaults before the tick is
//! pushed.

use crate::batcher::BatchSink;
use crate::db::Database;
use crate::types::{TradeAction, TradeDirection, TradeTick};
use crate::BoxError;
use async_trait::async_trait;
use std::sync::Arc;

impl TradeTick {
    /// Build a tick from possibly incomplete event data.
    ///
    /// Missing strings become empty, missing amounts become "0"; the fields
    /// that did decode are kept as-is.
    #[allow(clippy::too_many_arguments)]
    pub fn from_event(
        pool_id: i64,
        pair_contract: Option<String>,
        action: TradeAction,
        direction: TradeDirection,
        offer_denom: Option<String>,
        ask_denom: Option<String>,
        offer_amount: Option<String>,
        ask_amount: Option<String>,
        is_router: bool,
        reserve_offer: Option<String>,
        reserve_ask: Option<String>,
        height: i64,
        tx_hash: Option<String>,
        signer: Option<String>,
        msg_index: i64,
        timestamp: i64,
    ) -> Self {
        Self {
            pool_id,
            pair_contract: pair_contract.unwrap_or_default(),
            action,
            direction,
            offer_denom: offer_denom.unwrap_or_default(),
            ask_denom: ask_denom.unwrap_or_default(),
            offer_amount: offer_amount.unwrap_or_else(|| "0".to_string()),
            ask_amount: ask_amount.unwrap_or_else(|| "0".to_string()),
            is_router,
            reserve_offer: reserve_offer.unwrap_or_else(|| "0".to_string()),
            reserve_ask: reserve_ask.unwrap_or_else(|| "0".to_string()),
            height,
            tx_hash: tx_hash.unwrap_or_default(),
            signer: signer.unwrap_or_default(),
            msg_index,
            timestamp,
        }
    }
}

/// Appends raw trade rows as they come off the batcher.
pub struct TradeSink {
    db: Arc<Database>,
}

impl TradeSink {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BatchSink<TradeTick> for TradeSink {
    async fn flush(&self, items: Vec<TradeTick>) -> Result<(), BoxError> {
        if items.is_empty() {
            return Ok(());
        }
        let total = items.len();
        let written = self.db.insert_trades(&items)?;
        if written < total {
            log::debug!("{} of {} trades were redeliveries, ignored", total - written, total);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_event_coerces_missing_fields() {
        let tick = TradeTick::from_event(
            3,
            None,
            TradeAction::Swap,
            TradeDirection::Sell,
            Some("uzig".to_string()),
            None,
            None,
            Some("5000".to_string()),
            true,
            None,
            None,
            99,
            None,
            None,
            0,
            1_700_000_123,
        );

        assert_eq!(tick.pair_contract, "");
        assert_eq!(tick.offer_denom, "uzig");
        assert_eq!(tick.ask_denom, "");
        assert_eq!(tick.offer_amount, "0");
        assert_eq!(tick.ask_amount, "5000");
        assert_eq!(tick.tx_hash, "");
        assert_eq!(tick.signer, "");
    }

    #[tokio::test]
    async fn test_flush_appends_and_ignores_redeliveries() {
        let temp = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::open(temp.path().to_str().unwrap()).unwrap());
        let sink = TradeSink::new(db.clone());

        let tick = TradeTick::from_event(
            1,
            Some("zig1pair".to_string()),
            TradeAction::Swap,
            TradeDirection::Buy,
            Some("uzig".to_string()),
            Some("utoken".to_string()),
            Some("1000".to_string()),
            Some("42".to_string()),
            false,
            Some("900".to_string()),
            Some("120".to_string()),
            555,
            Some("TX1".to_string()),
            Some("zig1signer".to_string()),
            0,
            1_700_000_000,
        );

        sink.flush(vec![tick.clone()]).await.unwrap();
        // At-least-once redelivery of the same tick is a no-op.
        sink.flush(vec![tick.clone()]).await.unwrap();

        // A direct re-insert confirms the row already exists exactly once.
        assert_eq!(db.insert_trades(&[tick]).unwrap(), 0);
    }
}
