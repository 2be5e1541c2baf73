//! Pool graph: thread-safe indices over tracked pools.
//!
//! Two primary indices (pool by address, pools by token pair) plus a
//! token→pools adjacency used by cycle search, and a per-pool tick store.
//! Values are replaced whole per update, so concurrent readers observe
//! either the pre- or post-update snapshot, never a torn one.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::math::fixed_point;
use crate::types::{PoolState, SwapEvent, TickRecord, TokenPair};

/// Outcome of applying a swap event to the graph.
#[derive(Debug, Clone)]
pub enum SwapApply {
    /// The pool was tracked; carries pre- and post-update state.
    Updated { old: PoolState, new: PoolState },
    /// The pool is not tracked yet; caller should fetch and register it.
    Unknown,
}

#[derive(Debug, Default)]
pub struct PoolGraph {
    pools: Arc<DashMap<Address, PoolState>>,
    by_pair: Arc<DashMap<TokenPair, Vec<Address>>>,
    by_token: Arc<DashMap<Address, Vec<Address>>>,
    ticks: Arc<DashMap<Address, Vec<TickRecord>>>,
}

impl PoolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a pool, indexing it by pair and by both tokens.
    pub fn register_pool(&self, state: PoolState) {
        let address = state.address;
        let pair = state.pair;

        self.pools.insert(address, state);

        let mut entry = self.by_pair.entry(pair).or_default();
        if !entry.contains(&address) {
            entry.push(address);
            entry.sort();
        }
        drop(entry);

        for token in [pair.token0, pair.token1] {
            let mut entry = self.by_token.entry(token).or_default();
            if !entry.contains(&address) {
                entry.push(address);
                entry.sort();
            }
        }
        debug!("registered pool {address} for pair {:?}", pair);
    }

    /// Replace the tick map for a pool. Records are stored sorted by index.
    pub fn set_ticks(&self, pool: Address, mut ticks: Vec<TickRecord>) {
        ticks.sort_by_key(|t| t.index);
        self.ticks.insert(pool, ticks);
    }

    pub fn ticks(&self, pool: Address) -> Vec<TickRecord> {
        self.ticks.get(&pool).map(|t| t.clone()).unwrap_or_default()
    }

    /// Apply a swap event: replace the pool state atomically. The stored
    /// tick is re-derived from the sqrt price when the event disagrees.
    pub fn apply_swap(&self, event: &SwapEvent) -> SwapApply {
        let Some(old) = self.pools.get(&event.pool).map(|p| p.clone()) else {
            return SwapApply::Unknown;
        };

        let mut new = old.clone();
        new.sqrt_price_q96 = event.sqrt_price_q96;
        new.liquidity = event.liquidity;
        new.tick = event.tick;
        new.last_block = event.block_number;
        new.last_updated_ms = event.timestamp_ms;

        if !new.sqrt_price_q96.is_zero() && !new.tick_consistent() {
            let derived = fixed_point::tick_at_sqrt_q96(new.sqrt_price_q96);
            warn!(
                "pool {}: event tick {} disagrees with sqrt price (derived {derived}); using derived",
                event.pool, event.tick
            );
            new.tick = derived;
        }

        self.pools.insert(event.pool, new.clone());
        SwapApply::Updated { old, new }
    }

    pub fn get(&self, pool: Address) -> Option<PoolState> {
        self.pools.get(&pool).map(|p| p.clone())
    }

    pub fn contains(&self, pool: Address) -> bool {
        self.pools.contains_key(&pool)
    }

    /// All tracked pools for a pair, sorted by address.
    pub fn pools_for_pair(&self, pair: TokenPair) -> Vec<PoolState> {
        let addresses = match self.by_pair.get(&pair) {
            Some(a) => a.clone(),
            None => return vec![],
        };
        addresses.iter().filter_map(|a| self.get(*a)).collect()
    }

    /// All tracked pools containing `token`, sorted by address.
    pub fn pools_with_token(&self, token: Address) -> Vec<PoolState> {
        let addresses = match self.by_token.get(&token) {
            Some(a) => a.clone(),
            None => return vec![],
        };
        addresses.iter().filter_map(|a| self.get(*a)).collect()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// (pool count, oldest update ms, newest update ms).
    pub fn stats(&self) -> (usize, i64, i64) {
        let count = self.pools.len();
        let oldest = self.pools.iter().map(|p| p.last_updated_ms).min().unwrap_or(0);
        let newest = self.pools.iter().map(|p| p.last_updated_ms).max().unwrap_or(0);
        (count, oldest, newest)
    }
}

impl Clone for PoolGraph {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
            by_pair: Arc::clone(&self.by_pair),
            by_token: Arc::clone(&self.by_token),
            ticks: Arc::clone(&self.ticks),
        }
    }
}
