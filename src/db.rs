//! SQLite storage for the indexer
//!
//! Hot-path tables (`trades`, `candles`) are append-only: the batchers only
//! ever bulk-insert, and readers resolve the newest row per key. Selection
//! inputs (`pools`, `prices`, `pool_metrics`) are owned by the external
//! rollup jobs; this module only reads them, plus upserts used by those jobs
//! and by tests.

use crate::types::{Candle, Pool, PriceRow, TradeTick};
use crate::BoxError;
use rusqlite::{Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS trades (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    pool_id         INTEGER NOT NULL,
    pair_contract   TEXT NOT NULL,
    action          TEXT NOT NULL,
    direction       TEXT NOT NULL,
    offer_denom     TEXT NOT NULL,
    ask_denom       TEXT NOT NULL,
    offer_amount    TEXT NOT NULL,
    ask_amount      TEXT NOT NULL,
    is_router       INTEGER NOT NULL,
    reserve_offer   TEXT NOT NULL,
    reserve_ask     TEXT NOT NULL,
    height          INTEGER NOT NULL,
    tx_hash         TEXT NOT NULL,
    signer          TEXT NOT NULL,
    msg_index       INTEGER NOT NULL,
    timestamp       INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_trades_tx_msg ON trades(tx_hash, msg_index);
CREATE INDEX IF NOT EXISTS idx_trades_pool_ts ON trades(pool_id, timestamp);

CREATE TABLE IF NOT EXISTS candles (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    pool_id         INTEGER NOT NULL,
    bucket_start    INTEGER NOT NULL,
    open            REAL NOT NULL,
    high            REAL NOT NULL,
    low             REAL NOT NULL,
    close           REAL NOT NULL,
    volume          REAL NOT NULL,
    trade_count     INTEGER NOT NULL,
    liquidity       REAL,
    inserted_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_candles_pool_bucket ON candles(pool_id, bucket_start, id);

CREATE TABLE IF NOT EXISTS pools (
    id              INTEGER PRIMARY KEY,
    pair_contract   TEXT NOT NULL,
    base_token_id   INTEGER NOT NULL,
    quote_token_id  INTEGER NOT NULL,
    uzig_quoted     INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS prices (
    pool_id         INTEGER PRIMARY KEY,
    token_id        INTEGER NOT NULL,
    price_uzig      REAL NOT NULL,
    updated_at      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prices_token ON prices(token_id, updated_at);

CREATE TABLE IF NOT EXISTS pool_metrics (
    pool_id         INTEGER NOT NULL,
    window          TEXT NOT NULL,
    tvl_uzig        REAL NOT NULL,
    PRIMARY KEY (pool_id, window)
);
"#;

/// Shared handle to the indexer database.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// Schema statements all carry IF NOT EXISTS, so reopening an existing
    /// database is a no-op. WAL mode keeps readers off the writers' backs.
    pub fn open(path: &str) -> Result<Self, BoxError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        log::info!("📦 Database ready at {}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Bulk-append raw trade rows in one transaction.
    ///
    /// INSERT OR IGNORE against the (tx_hash, msg_index) unique index makes
    /// redelivered batches harmless under at-least-once ingestion.
    pub fn insert_trades(&self, ticks: &[TradeTick]) -> Result<usize, BoxError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT OR IGNORE INTO trades (
                    pool_id, pair_contract, action, direction,
                    offer_denom, ask_denom, offer_amount, ask_amount,
                    is_router, reserve_offer, reserve_ask,
                    height, tx_hash, signer, msg_index, timestamp
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for tick in ticks {
                written += stmt.execute(rusqlite::params![
                    tick.pool_id,
                    tick.pair_contract,
                    tick.action.as_str(),
                    tick.direction.as_str(),
                    tick.offer_denom,
                    tick.ask_denom,
                    tick.offer_amount,
                    tick.ask_amount,
                    tick.is_router,
                    tick.reserve_offer,
                    tick.reserve_ask,
                    tick.height,
                    tick.tx_hash,
                    tick.signer,
                    tick.msg_index,
                    tick.timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Bulk-append candle rows in one transaction.
    ///
    /// No upsert: a later flush for the same (pool, bucket) writes a new row
    /// and readers take the one with the highest rowid.
    pub fn insert_candles(&self, candles: &[Candle]) -> Result<(), BoxError> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO candles (
                    pool_id, bucket_start, open, high, low, close,
                    volume, trade_count, liquidity, inserted_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for c in candles {
                stmt.execute(rusqlite::params![
                    c.pool_id,
                    c.bucket_start,
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume,
                    c.trade_count,
                    c.liquidity,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Most recent candle close for a pool, latest write wins.
    pub fn latest_close(&self, pool_id: i64) -> Result<Option<f64>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let close = conn
            .query_row(
                "SELECT close FROM candles WHERE pool_id = ?
                 ORDER BY bucket_start DESC, id DESC LIMIT 1",
                [pool_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(close)
    }

    /// Most recent candle close at or before `cutoff`, latest write wins.
    pub fn close_at_or_before(&self, pool_id: i64, cutoff: i64) -> Result<Option<f64>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let close = conn
            .query_row(
                "SELECT close FROM candles WHERE pool_id = ? AND bucket_start <= ?
                 ORDER BY bucket_start DESC, id DESC LIMIT 1",
                [pool_id, cutoff],
                |row| row.get(0),
            )
            .optional()?;
        Ok(close)
    }

    /// Newest version of each of the pool's most recent `limit` candles.
    pub fn recent_candles(&self, pool_id: i64, limit: i64) -> Result<Vec<Candle>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT pool_id, bucket_start, open, high, low, close, volume, trade_count, liquidity
            FROM candles
            WHERE id IN (
                SELECT MAX(id) FROM candles WHERE pool_id = ? GROUP BY bucket_start
            )
            ORDER BY bucket_start DESC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map([pool_id, limit], |row| {
            Ok(Candle {
                pool_id: row.get(0)?,
                bucket_start: row.get(1)?,
                open: row.get(2)?,
                high: row.get(3)?,
                low: row.get(4)?,
                close: row.get(5)?,
                volume: row.get(6)?,
                trade_count: row.get(7)?,
                liquidity: row.get(8)?,
            })
        })?;
        let mut candles = Vec::new();
        for row in rows {
            candles.push(row?);
        }
        Ok(candles)
    }

    /// Look up a pool by id.
    pub fn pool_by_id(&self, pool_id: i64) -> Result<Option<Pool>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let pool = conn
            .query_row(
                "SELECT id, pair_contract, base_token_id, quote_token_id, uzig_quoted, created_at
                 FROM pools WHERE id = ?",
                [pool_id],
                Self::map_pool,
            )
            .optional()?;
        Ok(pool)
    }

    /// Earliest-created uzig-quoted pool whose base token is `token_id`.
    pub fn earliest_uzig_pool(&self, token_id: i64) -> Result<Option<Pool>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let pool = conn
            .query_row(
                "SELECT id, pair_contract, base_token_id, quote_token_id, uzig_quoted, created_at
                 FROM pools WHERE base_token_id = ? AND uzig_quoted = 1
                 ORDER BY created_at ASC LIMIT 1",
                [token_id],
                Self::map_pool,
            )
            .optional()?;
        Ok(pool)
    }

    /// The `limit` most recently updated prices for uzig-quoted pools of a
    /// token, newest first, each joined with its pool's pair contract.
    pub fn recent_token_prices(
        &self,
        token_id: i64,
        limit: i64,
    ) -> Result<Vec<(PriceRow, String)>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT pr.pool_id, pr.token_id, pr.price_uzig, pr.updated_at, po.pair_contract
            FROM prices pr
            JOIN pools po ON po.id = pr.pool_id
            WHERE po.base_token_id = ? AND po.uzig_quoted = 1
            ORDER BY pr.updated_at DESC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map([token_id, limit], |row| {
            Ok((
                PriceRow {
                    pool_id: row.get(0)?,
                    token_id: row.get(1)?,
                    price_uzig: row.get(2)?,
                    updated_at: row.get(3)?,
                },
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut prices = Vec::new();
        for row in rows {
            prices.push(row?);
        }
        Ok(prices)
    }

    /// Latest price row for one pool.
    pub fn price_for_pool(&self, pool_id: i64) -> Result<Option<PriceRow>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let price = conn
            .query_row(
                "SELECT pool_id, token_id, price_uzig, updated_at FROM prices WHERE pool_id = ?",
                [pool_id],
                |row| {
                    Ok(PriceRow {
                        pool_id: row.get(0)?,
                        token_id: row.get(1)?,
                        price_uzig: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(price)
    }

    /// Trailing TVL for a pool and window label (e.g. "24h"). Missing → None.
    pub fn pool_tvl(&self, pool_id: i64, window: &str) -> Result<Option<f64>, BoxError> {
        let conn = self.conn.lock().unwrap();
        let tvl = conn
            .query_row(
                "SELECT tvl_uzig FROM pool_metrics WHERE pool_id = ? AND window = ?",
                rusqlite::params![pool_id, window],
                |row| row.get(0),
            )
            .optional()?;
        Ok(tvl)
    }

    /// Upsert a pool registry row (rollup-job / test surface).
    pub fn upsert_pool(&self, pool: &Pool) -> Result<(), BoxError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO pools (id, pair_contract, base_token_id, quote_token_id, uzig_quoted, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                pair_contract = excluded.pair_contract,
                base_token_id = excluded.base_token_id,
                quote_token_id = excluded.quote_token_id,
                uzig_quoted = excluded.uzig_quoted,
                created_at = excluded.created_at
            "#,
            rusqlite::params![
                pool.id,
                pool.pair_contract,
                pool.base_token_id,
                pool.quote_token_id,
                pool.uzig_quoted,
                pool.created_at,
            ],
        )?;
        Ok(())
    }

    /// Upsert the latest price for a pool (rollup-job / test surface).
    pub fn upsert_price(&self, price: &PriceRow) -> Result<(), BoxError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO prices (pool_id, token_id, price_uzig, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(pool_id) DO UPDATE SET
                token_id = excluded.token_id,
                price_uzig = excluded.price_uzig,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![
                price.pool_id,
                price.token_id,
                price.price_uzig,
                price.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Upsert a windowed pool metric (rollup-job / test surface).
    pub fn upsert_pool_metric(
        &self,
        pool_id: i64,
        window: &str,
        tvl_uzig: f64,
    ) -> Result<(), BoxError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO pool_metrics (pool_id, window, tvl_uzig)
            VALUES (?, ?, ?)
            ON CONFLICT(pool_id, window) DO UPDATE SET tvl_uzig = excluded.tvl_uzig
            "#,
            rusqlite::params![pool_id, window, tvl_uzig],
        )?;
        Ok(())
    }

    fn map_pool(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pool> {
        Ok(Pool {
            id: row.get(0)?,
            pair_contract: row.get(1)?,
            base_token_id: row.get(2)?,
            quote_token_id: row.get(3)?,
            uzig_quoted: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TradeAction, TradeDirection};
    use tempfile::NamedTempFile;

    fn open_test_db() -> (NamedTempFile, Database) {
        let temp = NamedTempFile::new().unwrap();
        let db = Database::open(temp.path().to_str().unwrap()).unwrap();
        (temp, db)
    }

    fn make_tick(tx_hash: &str, msg_index: i64) -> TradeTick {
        TradeTick {
            pool_id: 1,
            pair_contract: "zig1pair".to_string(),
            action: TradeAction::Swap,
            direction: TradeDirection::Buy,
            offer_denom: "uzig".to_string(),
            ask_denom: "factory/zig1abc/utoken".to_string(),
            offer_amount: "1000000".to_string(),
            ask_amount: "42".to_string(),
            is_router: false,
            reserve_offer: "900000000".to_string(),
            reserve_ask: "120000".to_string(),
            height: 123456,
            tx_hash: tx_hash.to_string(),
            signer: "zig1signer".to_string(),
            msg_index,
            timestamp: 1_700_000_000,
        }
    }

    fn make_candle(pool_id: i64, bucket_start: i64, close: f64) -> Candle {
        Candle {
            pool_id,
            bucket_start,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            trade_count: 1,
            liquidity: None,
        }
    }

    #[test]
    fn test_insert_trades_dedupes_on_tx_and_msg_index() {
        let (_temp, db) = open_test_db();

        let first = db
            .insert_trades(&[make_tick("HASH_A", 0), make_tick("HASH_A", 1)])
            .unwrap();
        assert_eq!(first, 2);

        // Redelivered batch: same keys, nothing new written.
        let second = db
            .insert_trades(&[make_tick("HASH_A", 0), make_tick("HASH_B", 0)])
            .unwrap();
        assert_eq!(second, 1);
    }

    #[test]
    fn test_latest_close_picks_newest_write_for_same_bucket() {
        let (_temp, db) = open_test_db();

        // Two flush cycles append two versions of the same bucket.
        db.insert_candles(&[make_candle(1, 600, 10.0)]).unwrap();
        db.insert_candles(&[make_candle(1, 600, 12.0)]).unwrap();

        assert_eq!(db.latest_close(1).unwrap(), Some(12.0));
    }

    #[test]
    fn test_close_at_or_before_cutoff() {
        let (_temp, db) = open_test_db();

        db.insert_candles(&[
            make_candle(1, 600, 10.0),
            make_candle(1, 660, 11.0),
            make_candle(1, 720, 12.0),
        ])
        .unwrap();

        assert_eq!(db.close_at_or_before(1, 660).unwrap(), Some(11.0));
        assert_eq!(db.close_at_or_before(1, 659).unwrap(), Some(10.0));
        assert_eq!(db.close_at_or_before(1, 599).unwrap(), None);
    }

    #[test]
    fn test_recent_candles_resolves_duplicate_buckets() {
        let (_temp, db) = open_test_db();

        db.insert_candles(&[make_candle(1, 600, 10.0), make_candle(1, 660, 11.0)])
            .unwrap();
        db.insert_candles(&[make_candle(1, 660, 99.0)]).unwrap();

        let candles = db.recent_candles(1, 10).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].bucket_start, 660);
        assert_eq!(candles[0].close, 99.0);
        assert_eq!(candles[1].close, 10.0);
    }

    #[test]
    fn test_pool_tvl_missing_is_none() {
        let (_temp, db) = open_test_db();
        assert_eq!(db.pool_tvl(7, "24h").unwrap(), None);

        db.upsert_pool_metric(7, "24h", 1234.5).unwrap();
        assert_eq!(db.pool_tvl(7, "24h").unwrap(), Some(1234.5));
    }
}
