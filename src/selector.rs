//! Price/pool selection and percent change
//!
//! Read-path companions to the write pipeline: given a token, decide which
//! pool's price is "the" price, and compute point-in-time percent change for
//! a pool's candle series. Not-found conditions are results, not errors;
//! only storage failures propagate.

use crate::db::Database;
use crate::BoxError;

/// How many recently updated prices the Best policy considers.
pub const BEST_PRICE_CANDIDATES: i64 = 16;

/// TVL window label used for the Best-policy tie break.
pub const TVL_WINDOW_24H: &str = "24h";

/// Pool selection policy for a token's canonical price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PricePolicy {
    /// Caller names the pool; valid only if its base token matches.
    Pool(i64),
    /// Earliest-created uzig-quoted pool for the token.
    First,
    /// Lowest price among recently updated uzig-quoted pools, ties broken by
    /// trailing-24h TVL.
    #[default]
    Best,
}

/// Resolved canonical pool and price for a token.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPool {
    pub pool_id: i64,
    pub pair_contract: String,
    pub price_uzig: f64,
}

/// Resolve the pool whose price represents the token under `policy`.
///
/// Unknown token, unknown pool, mismatched base token, or a pool with no
/// price row all yield `Ok(None)`.
pub fn select_price_pool(
    db: &Database,
    token_id: i64,
    policy: PricePolicy,
) -> Result<Option<SelectedPool>, BoxError> {
    if token_id <= 0 {
        return Ok(None);
    }

    match policy {
        PricePolicy::Pool(pool_id) => {
            if pool_id <= 0 {
                return Ok(None);
            }
            let Some(pool) = db.pool_by_id(pool_id)? else {
                return Ok(None);
            };
            if pool.base_token_id != token_id {
                return Ok(None);
            }
            let Some(price) = db.price_for_pool(pool_id)? else {
                return Ok(None);
            };
            Ok(Some(SelectedPool {
                pool_id,
                pair_contract: pool.pair_contract,
                price_uzig: price.price_uzig,
            }))
        }
        PricePolicy::First => {
            let Some(pool) = db.earliest_uzig_pool(token_id)? else {
                return Ok(None);
            };
            let Some(price) = db.price_for_pool(pool.id)? else {
                return Ok(None);
            };
            Ok(Some(SelectedPool {
                pool_id: pool.id,
                pair_contract: pool.pair_contract,
                price_uzig: price.price_uzig,
            }))
        }
        PricePolicy::Best => best_uzig_pool(db, token_id),
    }
}

/// Best execution venue for a token: among the 16 most recently updated
/// prices of its uzig-quoted pools, the lowest price wins; equal prices go to
/// the pool with the larger trailing-24h TVL (missing TVL counts as zero).
pub fn best_uzig_pool(db: &Database, token_id: i64) -> Result<Option<SelectedPool>, BoxError> {
    if token_id <= 0 {
        return Ok(None);
    }

    let candidates = db.recent_token_prices(token_id, BEST_PRICE_CANDIDATES)?;
    let mut best: Option<(SelectedPool, f64)> = None;

    for (price, pair_contract) in candidates {
        let tvl = db.pool_tvl(price.pool_id, TVL_WINDOW_24H)?.unwrap_or(0.0);
        let better = match &best {
            None => true,
            Some((current, current_tvl)) => {
                price.price_uzig < current.price_uzig
                    || (price.price_uzig == current.price_uzig && tvl > *current_tvl)
            }
        };
        if better {
            best = Some((
                SelectedPool {
                    pool_id: price.pool_id,
                    pair_contract,
                    price_uzig: price.price_uzig,
                },
                tvl,
            ));
        }
    }

    Ok(best.map(|(selected, _)| selected))
}

/// Percent change of a pool's close over the last `window_minutes` minutes,
/// relative to `now`.
///
/// Returns `None` for non-positive pool id or window, when either close is
/// missing, or when the earlier close is non-positive (division guard).
pub fn change_pct(
    db: &Database,
    pool_id: i64,
    window_minutes: i64,
    now: i64,
) -> Result<Option<f64>, BoxError> {
    if pool_id <= 0 || window_minutes <= 0 {
        return Ok(None);
    }

    let Some(last) = db.latest_close(pool_id)? else {
        return Ok(None);
    };
    let cutoff = now - window_minutes * 60;
    let Some(prev) = db.close_at_or_before(pool_id, cutoff)? else {
        return Ok(None);
    };
    if prev <= 0.0 {
        return Ok(None);
    }

    Ok(Some((last - prev) / prev * 100.0))
}
