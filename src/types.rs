//! Core data types shared by the ingestion pipeline and read models

use serde::{Deserialize, Serialize};

/// Fractional digits kept for prices (OHLC).
pub const PRICE_SCALE: u32 = 18;

/// Fractional digits kept for volumes and liquidity.
pub const AMOUNT_SCALE: u32 = 8;

/// What the on-chain message did to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Swap,
    Provide,
    Withdraw,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Swap => "swap",
            TradeAction::Provide => "provide",
            TradeAction::Withdraw => "withdraw",
        }
    }
}

/// Direction of the event relative to the pool's base token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Buy,
    Sell,
    Provide,
    Withdraw,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "buy",
            TradeDirection::Sell => "sell",
            TradeDirection::Provide => "provide",
            TradeDirection::Withdraw => "withdraw",
        }
    }
}

/// One decoded swap/provide/withdraw event, in flight between the event
/// processor and the trade writer.
///
/// Amounts and reserves are raw base-unit integers carried as strings; they
/// can exceed i64 and are never used for arithmetic on the write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeTick {
    pub pool_id: i64,
    pub pair_contract: String,
    pub action: TradeAction,
    pub direction: TradeDirection,
    pub offer_denom: String,
    pub ask_denom: String,
    pub offer_amount: String,
    pub ask_amount: String,
    pub is_router: bool,
    pub reserve_offer: String,
    pub reserve_ask: String,
    pub height: i64,
    pub tx_hash: String,
    pub signer: String,
    pub msg_index: i64,
    /// Event time, second resolution (sub-second truncated upstream).
    pub timestamp: i64,
}

/// One price point destined for candle aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleInput {
    pub pool_id: i64,
    /// Minute-truncated bucket start (unix seconds).
    pub bucket_start: i64,
    pub price: f64,
    pub volume: f64,
    pub trade_count: i64,
    pub liquidity: Option<f64>,
}

/// Persisted OHLCV row, keyed by (pool_id, bucket_start).
///
/// The candles table is append-only: the same key may appear in several rows
/// across flush cycles and readers pick the most recently written one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub pool_id: i64,
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: i64,
    pub liquidity: Option<f64>,
}

/// Pool registry row, maintained by external rollup jobs. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: i64,
    pub pair_contract: String,
    pub base_token_id: i64,
    pub quote_token_id: i64,
    /// True when the pool quotes its base token in uzig.
    pub uzig_quoted: bool,
    pub created_at: i64,
}

/// Latest known price of a token in one pool, in uzig. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRow {
    pub pool_id: i64,
    pub token_id: i64,
    pub price_uzig: f64,
    pub updated_at: i64,
}

/// Windowed pool metric (TVL), maintained by rollup jobs. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolMetric {
    pub pool_id: i64,
    pub window: String,
    pub tvl_uzig: f64,
}

/// Truncate an event timestamp to its minute bucket start.
pub fn minute_bucket(ts: i64) -> i64 {
    ts - ts.rem_euclid(60)
}

/// Round to `scale` fractional digits; non-finite values coerce to zero so a
/// bad upstream field never poisons a whole batch.
pub fn quantize(value: f64, scale: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(scale as i32);
    (value * factor).round() / factor
}

/// Price quantization (18 fractional digits).
pub fn quantize_price(value: f64) -> f64 {
    quantize(value, PRICE_SCALE)
}

/// Volume/liquidity quantization (8 fractional digits).
pub fn quantize_amount(value: f64) -> f64 {
    quantize(value, AMOUNT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_bucket_truncates() {
        assert_eq!(minute_bucket(1_700_000_059), 1_700_000_040);
        assert_eq!(minute_bucket(1_700_000_040), 1_700_000_040);
        assert_eq!(minute_bucket(0), 0);
    }

    #[test]
    fn test_quantize_non_finite_coerces_to_zero() {
        assert_eq!(quantize_price(f64::NAN), 0.0);
        assert_eq!(quantize_price(f64::INFINITY), 0.0);
        assert_eq!(quantize_amount(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_quantize_amount_rounds_to_eight_digits() {
        assert_eq!(quantize_amount(1.234567894), 1.23456789);
        assert_eq!(quantize_amount(1.234567896), 1.2345679);
    }

    #[test]
    fn test_action_direction_labels() {
        assert_eq!(TradeAction::Swap.as_str(), "swap");
        assert_eq!(TradeDirection::Sell.as_str(), "sell");
    }

    #[test]
    fn test_candle_serializes_for_api_consumers() {
        let candle = Candle {
            pool_id: 1,
            bucket_start: 600,
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close: 9.0,
            volume: 3.0,
            trade_count: 3,
            liquidity: None,
        };

        let json = serde_json::to_value(&candle).unwrap();
        assert_eq!(json["pool_id"], 1);
        assert_eq!(json["close"], 9.0);
        assert!(json["liquidity"].is_null());
    }
}
