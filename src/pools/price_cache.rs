//! Per-pool price points with confidence and freshness.
//!
//! A new point is derived on every pool mutation. Confidence starts at 1.0
//! and is penalized for trades with heavy price impact and for dust-sized
//! trades, both of which make the printed price less trustworthy.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;

use crate::types::{PoolState, PricePoint};

/// Impact above this (bps) starts degrading confidence.
pub const HIGH_IMPACT_BPS: f64 = 100.0;

/// Trades below this USD size are treated as weak price evidence.
pub const SMALL_TRADE_USD: f64 = 100.0;

/// Floor so even a dust trade keeps a usable point.
const MIN_CONFIDENCE: f64 = 0.1;

#[derive(Debug, Default)]
pub struct PriceCache {
    points: Arc<DashMap<Address, PricePoint>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive and store a fresh price point from an updated pool state.
    pub fn update_from_pool(
        &self,
        state: &PoolState,
        impact_bps: f64,
        trade_size_usd: f64,
    ) -> PricePoint {
        let point = PricePoint {
            pool: state.address,
            price0_to_1: state.price0_to_1(),
            price1_to_0: state.price1_to_0(),
            liquidity: state.liquidity,
            fee_tier_bps: state.fee_tier_bps,
            confidence: confidence(impact_bps, trade_size_usd),
            timestamp_ms: state.last_updated_ms,
        };
        self.points.insert(state.address, point.clone());
        point
    }

    pub fn get(&self, pool: Address) -> Option<PricePoint> {
        self.points.get(&pool).map(|p| p.clone())
    }

    /// Point for `pool` only if it is no older than `max_age_ms`.
    pub fn get_fresh(&self, pool: Address, now_ms: i64, max_age_ms: i64) -> Option<PricePoint> {
        self.get(pool).filter(|p| p.is_fresh(now_ms, max_age_ms))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Clone for PriceCache {
    fn clone(&self) -> Self {
        Self { points: Arc::clone(&self.points) }
    }
}

/// Confidence in [MIN_CONFIDENCE, 1]: full for a clean print, scaled down
/// proportionally past the impact threshold and below the small-trade floor.
pub fn confidence(impact_bps: f64, trade_size_usd: f64) -> f64 {
    let impact_factor = if impact_bps <= HIGH_IMPACT_BPS {
        1.0
    } else {
        HIGH_IMPACT_BPS / impact_bps.max(HIGH_IMPACT_BPS)
    };
    let size_factor = if trade_size_usd >= SMALL_TRADE_USD {
        1.0
    } else {
        (trade_size_usd.max(0.0) / SMALL_TRADE_USD).max(MIN_CONFIDENCE)
    };
    (impact_factor * size_factor).clamp(MIN_CONFIDENCE, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed_point::Q96;
    use crate::types::TokenPair;

    fn pool() -> PoolState {
        PoolState {
            address: Address::repeat_byte(0xaa),
            pair: TokenPair::new(Address::repeat_byte(1), Address::repeat_byte(2)),
            sqrt_price_q96: Q96,
            liquidity: 1_000_000,
            tick: 0,
            fee_tier_bps: 30,
            tick_spacing: 60,
            last_block: 1,
            last_updated_ms: 10_000,
        }
    }

    #[test]
    fn clean_print_has_full_confidence() {
        assert_eq!(confidence(20.0, 5_000.0), 1.0);
    }

    #[test]
    fn heavy_impact_degrades_confidence() {
        let heavy = confidence(400.0, 5_000.0);
        assert!(heavy < 1.0);
        assert!((heavy - 0.25).abs() < 1e-12);
        assert!(confidence(800.0, 5_000.0) < heavy);
    }

    #[test]
    fn dust_trades_degrade_confidence() {
        assert!(confidence(10.0, 5.0) < confidence(10.0, 500.0));
        assert!(confidence(10.0, 0.0) >= MIN_CONFIDENCE);
    }

    #[test]
    fn stored_prices_are_reciprocal() {
        let cache = PriceCache::new();
        let point = cache.update_from_pool(&pool(), 10.0, 1_000.0);
        assert!((point.price0_to_1 * point.price1_to_0 - 1.0).abs() < 1e-9);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn freshness_window_is_enforced() {
        let cache = PriceCache::new();
        cache.update_from_pool(&pool(), 10.0, 1_000.0);
        let addr = Address::repeat_byte(0xaa);
        assert!(cache.get_fresh(addr, 12_000, 5_000).is_some());
        assert!(cache.get_fresh(addr, 16_001, 5_000).is_none());
    }
}
