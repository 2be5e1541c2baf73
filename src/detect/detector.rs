//! Opportunity detection over the live pool graph.
//!
//! Two discovery modes, both triggered per swap update:
//! cross-venue (same pair, different pools) and triangular (bounded DFS
//! cycles through the token graph, directional per hop). Stale price points
//! are silently skipped; detected opportunities are tracked until a sweep
//! evicts them.

use std::collections::HashSet;
use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::math::fixed_point;
use crate::pools::{PoolGraph, PriceCache};
use crate::providers::MarketPriceOracle;
use crate::types::{Opportunity, OpportunityKind, PoolHop, PoolState, PricePoint};

/// Competition discount at or above this maps to full competition level.
const FULL_COMPETITION_BPS: f64 = 50.0;

pub struct OpportunityDetector {
    cfg: DetectorConfig,
    graph: PoolGraph,
    cache: PriceCache,
    oracle: Arc<dyn MarketPriceOracle>,
    /// Live opportunities by id; swept when stale.
    active: DashMap<String, Opportunity>,
}

impl OpportunityDetector {
    pub fn new(
        cfg: DetectorConfig,
        graph: PoolGraph,
        cache: PriceCache,
        oracle: Arc<dyn MarketPriceOracle>,
    ) -> Self {
        Self { cfg, graph, cache, oracle, active: DashMap::new() }
    }

    /// Detect opportunities triggered by an update to `pool`. Results are in
    /// deterministic order (lexicographic path id).
    pub fn on_swap(&self, pool: Address, now: i64) -> Vec<Opportunity> {
        let Some(updated) = self.graph.get(pool) else {
            return vec![];
        };

        let mut found = self.cross_venue(&updated, now);
        found.extend(self.triangular(&updated, now));

        found.sort_by(|a, b| a.id.cmp(&b.id).then(b.min_size_usd.total_cmp(&a.min_size_usd)));

        for opp in &found {
            self.active.insert(opp.id.clone(), opp.clone());
        }
        found
    }

    /// Drop tracked opportunities older than the staleness threshold.
    /// Returns the number evicted.
    pub fn sweep(&self, now: i64) -> usize {
        let before = self.active.len();
        self.active
            .retain(|_, opp| opp.age_ms(now) <= self.cfg.stale_opportunity_ms);
        let evicted = before - self.active.len();
        if evicted > 0 {
            debug!("sweeper evicted {evicted} stale opportunities");
        }
        evicted
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    // ── Cross-venue ──────────────────────────────────────────────────────

    /// Compare the updated pool against every other pool for the same pair.
    /// Paths run cheaper pool → more expensive pool, starting in token1.
    fn cross_venue(&self, updated: &PoolState, now: i64) -> Vec<Opportunity> {
        let mut out = vec![];

        let Some(p_updated) = self.fresh_point(updated.address, now) else {
            return out;
        };

        for other in self.graph.pools_for_pair(updated.pair) {
            if other.address == updated.address {
                continue;
            }
            let Some(p_other) = self.fresh_point(other.address, now) else {
                continue;
            };

            let pa = p_updated.price0_to_1;
            let pb = p_other.price0_to_1;
            if pa <= 0.0 || pb <= 0.0 {
                continue;
            }

            let spread_bps = (pa - pb).abs() / pa.min(pb) * 1e4;
            if spread_bps < self.cfg.min_spread_bps {
                continue;
            }

            // token0 is cheaper where price0to1 is lower: buy there, sell
            // at the richer pool.
            let (cheap, rich, p_cheap, p_rich) = if pa < pb {
                (updated, &other, &p_updated, &p_other)
            } else {
                (&other, updated, &p_other, &p_updated)
            };

            let fees_bps = (p_cheap.fee_tier_bps + p_rich.fee_tier_bps) as f64;
            let adjusted_bps = spread_bps
                - fees_bps
                - self.cfg.slippage_bps_estimate
                - self.cfg.competition_discount_bps;
            if adjusted_bps <= 0.0 {
                continue;
            }

            let liquidity_usd = self.liquidity_usd(cheap).min(self.liquidity_usd(rich));
            if liquidity_usd < self.cfg.min_liquidity_usd {
                continue;
            }

            let path = vec![
                PoolHop { pool: cheap.address, zero_for_one: false },
                PoolHop { pool: rich.address, zero_for_one: true },
            ];
            let confidence = p_cheap.confidence.min(p_rich.confidence);

            if let Some(opp) = self.build_opportunity(
                OpportunityKind::CrossVenue,
                path,
                spread_bps,
                fees_bps,
                adjusted_bps,
                liquidity_usd,
                confidence,
                now,
            ) {
                info!(
                    "cross-venue {}: spread {:.1} bps, net ${:.2} @ ${:.0}",
                    opp.id, spread_bps, opp.profit_usd, opp.size_opt_usd
                );
                out.push(opp);
            }
        }
        out
    }

    // ── Triangular ───────────────────────────────────────────────────────

    /// Bounded DFS for cycles through the updated pool. The first hop is
    /// pinned to the updated pool; each further hop multiplies the
    /// directional price for the token actually carried in.
    fn triangular(&self, updated: &PoolState, now: i64) -> Vec<Opportunity> {
        let mut out = vec![];
        if self.cfg.max_path_length < 3 {
            return out;
        }

        for start in [updated.pair.token0, updated.pair.token1] {
            let Some(first) = self.hop(updated, start, now) else {
                continue;
            };
            let mut visited = HashSet::from([updated.address]);
            let mut path = vec![PoolHop {
                pool: updated.address,
                zero_for_one: start == updated.pair.token0,
            }];
            self.dfs(
                start,
                first.next_token,
                first.price,
                first.fee_bps,
                first.confidence,
                first.liquidity_usd,
                &mut visited,
                &mut path,
                now,
                &mut out,
            );
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        &self,
        start_token: Address,
        current_token: Address,
        product: f64,
        fees_bps: f64,
        confidence: f64,
        liquidity_usd: f64,
        visited: &mut HashSet<Address>,
        path: &mut Vec<PoolHop>,
        now: i64,
        out: &mut Vec<Opportunity>,
    ) {
        for pool in self.graph.pools_with_token(current_token) {
            if visited.contains(&pool.address) {
                continue;
            }
            let Some(hop) = self.hop(&pool, current_token, now) else {
                continue;
            };

            let hops = path.len() + 1;
            let product = product * hop.price;
            let fees_bps = fees_bps + hop.fee_bps;
            let confidence = confidence.min(hop.confidence);
            let liquidity_usd = liquidity_usd.min(hop.liquidity_usd);

            if hop.next_token == start_token {
                // A 2-hop cycle is cross-venue territory, not a triangle.
                if hops < 3 {
                    continue;
                }
                path.push(PoolHop {
                    pool: pool.address,
                    zero_for_one: current_token == pool.pair.token0,
                });
                self.emit_cycle(
                    product,
                    fees_bps,
                    confidence,
                    liquidity_usd,
                    path.clone(),
                    now,
                    out,
                );
                path.pop();
                continue;
            }

            if hops < self.cfg.max_path_length {
                visited.insert(pool.address);
                path.push(PoolHop {
                    pool: pool.address,
                    zero_for_one: current_token == pool.pair.token0,
                });
                self.dfs(
                    start_token,
                    hop.next_token,
                    product,
                    fees_bps,
                    confidence,
                    liquidity_usd,
                    visited,
                    path,
                    now,
                    out,
                );
                path.pop();
                visited.remove(&pool.address);
            }
        }
    }

    fn emit_cycle(
        &self,
        product: f64,
        fees_bps: f64,
        confidence: f64,
        liquidity_usd: f64,
        path: Vec<PoolHop>,
        now: i64,
        out: &mut Vec<Opportunity>,
    ) {
        let gross_bps = (product - 1.0) * 1e4;
        let adjusted_bps = gross_bps
            - fees_bps
            - self.cfg.slippage_bps_estimate
            - self.cfg.competition_discount_bps;
        if adjusted_bps <= 0.0 || liquidity_usd < self.cfg.min_liquidity_usd {
            return;
        }

        if let Some(opp) = self.build_opportunity(
            OpportunityKind::Triangular,
            path,
            gross_bps,
            fees_bps,
            adjusted_bps,
            liquidity_usd,
            confidence,
            now,
        ) {
            info!(
                "triangular {}: gross {:.1} bps, net ${:.2} @ ${:.0}",
                opp.id, gross_bps, opp.profit_usd, opp.size_opt_usd
            );
            out.push(opp);
        }
    }

    // ── Shared sizing & assembly ─────────────────────────────────────────

    /// Size as the geometric mean of the liquidity-bounded maximum and the
    /// gas-coverage minimum; emit only if net of gas stays positive.
    #[allow(clippy::too_many_arguments)]
    fn build_opportunity(
        &self,
        kind: OpportunityKind,
        path: Vec<PoolHop>,
        edge_bps: f64,
        fees_bps: f64,
        adjusted_bps: f64,
        liquidity_usd: f64,
        confidence: f64,
        now: i64,
    ) -> Option<Opportunity> {
        let gas_usd = self.cfg.gas_estimate_usd;
        let max_size = self.cfg.max_size_liquidity_fraction * liquidity_usd;
        if max_size <= 0.0 {
            return None;
        }
        let min_size = gas_usd / (adjusted_bps / 1e4);
        let size_opt = (max_size * min_size).sqrt().min(max_size);

        let net_profit = adjusted_bps / 1e4 * size_opt - gas_usd;
        if net_profit <= 0.0 {
            debug!("{kind} path rejected: net ${net_profit:.2} at size ${size_opt:.0}");
            return None;
        }

        let id = Opportunity::path_id(kind, &path);
        Some(Opportunity {
            id,
            kind,
            path,
            profit_usd: net_profit,
            edge_bps,
            fees_bps,
            size_opt_usd: size_opt,
            min_size_usd: min_size,
            max_size_usd: max_size,
            gas_usd,
            confidence,
            competition_level: (self.cfg.competition_discount_bps / FULL_COMPETITION_BPS)
                .clamp(0.0, 1.0),
            latency_budget_ms: self.cfg.latency_budget_ms,
            timestamp_ms: now,
        })
    }

    /// One directional hop through `pool` entering with `token_in`.
    /// None if the pool's price point is stale or unusable.
    fn hop(&self, pool: &PoolState, token_in: Address, now: i64) -> Option<Hop> {
        let next_token = pool.pair.other(token_in)?;
        let point = self.fresh_point(pool.address, now)?;
        let price = if token_in == pool.pair.token0 {
            point.price0_to_1
        } else {
            point.price1_to_0
        };
        if price <= 0.0 {
            return None;
        }
        Some(Hop {
            next_token,
            price,
            fee_bps: point.fee_tier_bps as f64,
            confidence: point.confidence,
            liquidity_usd: self.liquidity_usd(pool),
        })
    }

    fn fresh_point(&self, pool: Address, now: i64) -> Option<PricePoint> {
        self.cache.get_fresh(pool, now, self.cfg.price_freshness_ms)
    }

    /// USD value of the in-range liquidity: token1-equivalent of the virtual
    /// reserves on both sides, 18-decimal tokens assumed.
    fn liquidity_usd(&self, state: &PoolState) -> f64 {
        let sqrt_ratio = fixed_point::u256_to_f64(state.sqrt_price_q96) / 2f64.powi(96);
        let amount1_tokens = state.liquidity as f64 * sqrt_ratio / 1e18;
        2.0 * amount1_tokens * self.oracle.usd_per_token(state.pair.token1)
    }
}

struct Hop {
    next_token: Address,
    price: f64,
    fee_bps: f64,
    confidence: f64,
    liquidity_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed_point::{sqrt_q96_at_tick, Q96};
    use crate::providers::StaticPriceOracle;
    use crate::types::TokenPair;
    use alloy::primitives::U256;

    const NOW: i64 = 1_000_000;

    /// $1M of liquidity at price ~1 with $1 tokens.
    const DEEP_LIQUIDITY: u128 = 500_000_000_000_000_000_000_000;

    fn token(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn pool(addr: u8, t0: u8, t1: u8, sqrt: U256, fee_bps: u32) -> PoolState {
        PoolState {
            address: token(addr),
            pair: TokenPair::new(token(t0), token(t1)),
            sqrt_price_q96: sqrt,
            liquidity: DEEP_LIQUIDITY,
            tick: 0,
            fee_tier_bps: fee_bps,
            tick_spacing: 60,
            last_block: 1,
            last_updated_ms: NOW,
        }
    }

    fn setup(pools: Vec<PoolState>) -> OpportunityDetector {
        let graph = PoolGraph::new();
        let cache = PriceCache::new();
        for p in pools {
            graph.register_pool(p.clone());
            cache.update_from_pool(&p, 10.0, 5_000.0);
        }
        OpportunityDetector::new(
            DetectorConfig::default(),
            graph,
            cache,
            Arc::new(StaticPriceOracle::new(1.0)),
        )
    }

    #[test]
    fn cross_venue_emits_cheaper_to_richer() {
        // 25 bps apart, 1 bp fee tiers, both fresh.
        let detector = setup(vec![
            pool(0xaa, 1, 2, Q96, 1),
            pool(0xbb, 1, 2, sqrt_q96_at_tick(25), 1),
        ]);

        let opps = detector.on_swap(token(0xaa), NOW);
        let cross: Vec<_> = opps
            .iter()
            .filter(|o| o.kind == OpportunityKind::CrossVenue)
            .collect();
        assert_eq!(cross.len(), 1);

        let opp = cross[0];
        // token0 is cheaper in the pool at price 1.0.
        assert_eq!(opp.path[0].pool, token(0xaa));
        assert_eq!(opp.path[1].pool, token(0xbb));
        assert!(!opp.path[0].zero_for_one);
        assert!(opp.path[1].zero_for_one);
        assert!(opp.profit_usd > 0.0);
        assert!(opp.edge_bps > 24.0 && opp.edge_bps < 26.0);
    }

    #[test]
    fn thin_spread_is_ignored() {
        // 5 bps spread < 10 bps minimum.
        let detector = setup(vec![
            pool(0xaa, 1, 2, Q96, 1),
            pool(0xbb, 1, 2, sqrt_q96_at_tick(5), 1),
        ]);
        assert!(detector.on_swap(token(0xaa), NOW).is_empty());
    }

    #[test]
    fn stale_price_point_is_skipped() {
        let detector = setup(vec![
            pool(0xaa, 1, 2, Q96, 1),
            pool(0xbb, 1, 2, sqrt_q96_at_tick(25), 1),
        ]);
        // Both points stamped NOW; far in the future everything is stale.
        let later = NOW + 60_000;
        assert!(detector.on_swap(token(0xaa), later).is_empty());
    }

    #[test]
    fn triangular_cycle_is_directional() {
        // A→B rich by 40 bps, B→C and C→A flat: profitable A→B→C→A.
        let detector = setup(vec![
            pool(0xaa, 1, 2, sqrt_q96_at_tick(40), 1),
            pool(0xbb, 2, 3, Q96, 1),
            pool(0xcc, 1, 3, Q96, 1),
        ]);

        let opps = detector.on_swap(token(0xaa), NOW);
        let tri: Vec<_> = opps
            .iter()
            .filter(|o| o.kind == OpportunityKind::Triangular)
            .collect();
        assert_eq!(tri.len(), 1);

        let opp = tri[0];
        assert_eq!(opp.path.len(), 3);
        assert_eq!(opp.path[0].pool, token(0xaa));
        assert!(opp.profit_usd > 0.0);
        // Gross edge tracks the 40 bps mispricing.
        assert!(opp.edge_bps > 38.0 && opp.edge_bps < 42.0);
    }

    #[test]
    fn flat_triangle_is_not_emitted() {
        let detector = setup(vec![
            pool(0xaa, 1, 2, Q96, 1),
            pool(0xbb, 2, 3, Q96, 1),
            pool(0xcc, 1, 3, Q96, 1),
        ]);
        let opps = detector.on_swap(token(0xaa), NOW);
        assert!(opps.iter().all(|o| o.kind != OpportunityKind::Triangular));
    }

    #[test]
    fn sweep_evicts_stale_opportunities() {
        let detector = setup(vec![
            pool(0xaa, 1, 2, Q96, 1),
            pool(0xbb, 1, 2, sqrt_q96_at_tick(25), 1),
        ]);
        assert!(!detector.on_swap(token(0xaa), NOW).is_empty());
        assert!(detector.active_count() > 0);

        assert_eq!(detector.sweep(NOW + 5_000), 0);
        let evicted = detector.sweep(NOW + 20_000);
        assert!(evicted > 0);
        assert_eq!(detector.active_count(), 0);
    }

    #[test]
    fn emission_order_is_deterministic() {
        let pools = vec![
            pool(0xaa, 1, 2, Q96, 1),
            pool(0xbb, 1, 2, sqrt_q96_at_tick(25), 1),
            pool(0xcc, 1, 2, sqrt_q96_at_tick(30), 1),
        ];
        let detector = setup(pools.clone());
        let a: Vec<String> = detector.on_swap(token(0xaa), NOW).iter().map(|o| o.id.clone()).collect();

        let detector2 = setup(pools);
        let b: Vec<String> = detector2.on_swap(token(0xaa), NOW).iter().map(|o| o.id.clone()).collect();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
