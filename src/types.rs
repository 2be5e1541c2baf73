// Core data structures shared across the pipeline:
// pool state, price points, opportunities, evaluation inputs/results, signals.

use alloy::primitives::{Address, B256, I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::math::fixed_point;

/// Current time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// An unordered token pair, stored sorted by address so that
/// (A, B) and (B, A) index identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenPair {
    pub token0: Address,
    pub token1: Address,
}

impl TokenPair {
    pub fn new(a: Address, b: Address) -> Self {
        if a <= b {
            Self { token0: a, token1: b }
        } else {
            Self { token0: b, token1: a }
        }
    }

    /// The pair member that is not `token`, or None if `token` is neither.
    pub fn other(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    pub fn contains(&self, token: Address) -> bool {
        token == self.token0 || token == self.token1
    }
}

/// A swap observed on some venue. Ordered per pool by (block, log index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEvent {
    pub pool: Address,
    /// Signed token0 delta from the pool's perspective.
    pub amount0: I256,
    /// Signed token1 delta from the pool's perspective.
    pub amount1: I256,
    pub sqrt_price_q96: U256,
    pub liquidity: u128,
    pub tick: i32,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
}

/// Concentrated-liquidity pool state. Replaced atomically per swap event;
/// readers always observe a complete pre- or post-update snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolState {
    pub address: Address,
    pub pair: TokenPair,
    /// sqrt(price) as a Q64.96 fixed-point number.
    pub sqrt_price_q96: U256,
    /// Current in-range liquidity.
    pub liquidity: u128,
    pub tick: i32,
    pub fee_tier_bps: u32,
    pub tick_spacing: i32,
    pub last_block: u64,
    pub last_updated_ms: i64,
}

impl PoolState {
    /// Price of token0 in token1 raw units: sqrtPrice² / 2^192.
    pub fn price0_to_1(&self) -> f64 {
        fixed_point::price_from_sqrt_q96(self.sqrt_price_q96)
    }

    /// Price of token1 in token0 raw units.
    pub fn price1_to_0(&self) -> f64 {
        let p = self.price0_to_1();
        if p > 0.0 {
            1.0 / p
        } else {
            0.0
        }
    }

    /// Whether the stored tick agrees with the stored sqrt price (±1 tick).
    pub fn tick_consistent(&self) -> bool {
        if self.sqrt_price_q96.is_zero() {
            return false;
        }
        let derived = fixed_point::tick_at_sqrt_q96(self.sqrt_price_q96);
        (derived - self.tick).abs() <= 1
    }
}

/// An initialized tick: crossing it shifts in-range liquidity by
/// `liquidity_net` (direction-signed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    pub index: i32,
    pub liquidity_net: i128,
    /// Precomputed boundary sqrt price; derived from `index` when absent.
    pub sqrt_price_q96: Option<U256>,
}

impl TickRecord {
    /// Boundary sqrt price, computing it from the tick index when the
    /// record does not carry one.
    pub fn boundary_sqrt_q96(&self) -> U256 {
        self.sqrt_price_q96
            .unwrap_or_else(|| fixed_point::sqrt_q96_at_tick(self.index))
    }
}

/// Snapshot of a pool's price derived from its latest state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub pool: Address,
    pub price0_to_1: f64,
    pub price1_to_0: f64,
    pub liquidity: u128,
    pub fee_tier_bps: u32,
    /// Confidence in [0, 1]; penalized for high price impact and tiny trades.
    pub confidence: f64,
    pub timestamp_ms: i64,
}

impl PricePoint {
    pub fn age_ms(&self, now: i64) -> i64 {
        (now - self.timestamp_ms).max(0)
    }

    pub fn is_fresh(&self, now: i64, max_age_ms: i64) -> bool {
        self.age_ms(now) <= max_age_ms
    }
}

/// Opportunity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpportunityKind {
    Direct,
    CrossVenue,
    Triangular,
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpportunityKind::Direct => write!(f, "direct"),
            OpportunityKind::CrossVenue => write!(f, "cross_venue"),
            OpportunityKind::Triangular => write!(f, "triangular"),
        }
    }
}

/// One hop of an arbitrage path: which pool, and in which direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolHop {
    pub pool: Address,
    /// true = token0 in, token1 out.
    pub zero_for_one: bool,
}

/// A detected candidate arbitrage, owned by the detector until emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Deterministic id derived from kind + path; one live signal per id.
    pub id: String,
    pub kind: OpportunityKind,
    /// Ordered pool hops; cross-venue paths run cheaper → more expensive.
    pub path: Vec<PoolHop>,
    /// Estimated profit, net of the detector's gas estimate.
    pub profit_usd: f64,
    /// Estimated gross edge over the path, before fees.
    pub edge_bps: f64,
    /// Round-trip pool fees over the path.
    pub fees_bps: f64,
    pub size_opt_usd: f64,
    pub min_size_usd: f64,
    pub max_size_usd: f64,
    pub gas_usd: f64,
    pub confidence: f64,
    pub competition_level: f64,
    pub latency_budget_ms: u64,
    pub timestamp_ms: i64,
}

impl Opportunity {
    /// Deterministic id: kind + ordered pool addresses.
    pub fn path_id(kind: OpportunityKind, path: &[PoolHop]) -> String {
        let mut id = kind.to_string();
        for hop in path {
            id.push(':');
            id.push_str(&format!("{:x}", hop.pool));
        }
        id
    }

    pub fn age_ms(&self, now: i64) -> i64 {
        (now - self.timestamp_ms).max(0)
    }
}

/// Fee components charged against the success branch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Router + LP fees over the whole path.
    pub total_fees_bps: f64,
    pub flash_fee_bps: f64,
    pub referral_bps: f64,
    pub executor_fee_usd: f64,
    pub flash_fixed_usd: f64,
}

/// Per-attempt friction costs; gas and adverse selection carry dispersion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FrictionCosts {
    pub gas_usd_mean: f64,
    pub gas_usd_std: f64,
    pub adverse_usd_mean: f64,
    pub adverse_usd_std: f64,
    pub extra_usd: f64,
    pub mev_penalty_usd: f64,
}

/// Latency parameters feeding edge decay and fill probability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub latency_sec: f64,
    pub edge_decay_bps_per_sec: f64,
    pub base_fill_prob: f64,
    /// Fill-probability decay constant.
    pub theta: f64,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            latency_sec: 0.5,
            edge_decay_bps_per_sec: 0.0,
            base_fill_prob: 1.0,
            theta: 0.15,
        }
    }
}

/// Failure-mode probabilities; clamped and normalized by the payoff tree.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FailureProbs {
    pub fail_before: f64,
    pub fail_between: f64,
    pub reorg_or_mev: f64,
}

/// Slippage model selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SlippageSpec {
    /// Power-law curve: slipBps = k · (sizeUsd / liquidityRefUsd)^max(alpha, 1).
    Empirical {
        k: f64,
        alpha: f64,
        liquidity_ref_usd: f64,
    },
    /// Exact-enough UniV3 simulation against a captured pool state.
    UniV3 {
        sqrt_price_q96: U256,
        liquidity: u128,
        fee_tier_bps: u32,
        tick_spacing: i32,
        /// Sorted initialized ticks; empty degrades to a no-cross swap.
        ticks: Vec<TickRecord>,
        /// USD value of one whole token-in (18 decimals assumed).
        usd_per_token_in: f64,
        zero_for_one: bool,
    },
}

impl SlippageSpec {
    pub fn empirical(k: f64, alpha: f64, liquidity_ref_usd: f64) -> Self {
        SlippageSpec::Empirical { k, alpha, liquidity_ref_usd }
    }
}

/// Full input set for one evaluation. Immutable; passed by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageInputs {
    /// Gross edge before costs.
    pub edge_bps: f64,
    pub notional_usd: f64,
    pub fees: FeeSchedule,
    pub frictions: FrictionCosts,
    pub latency: LatencyProfile,
    pub slippage: SlippageSpec,
    pub failures: FailureProbs,
    pub flash_enabled: bool,
    pub risk_aversion_lambda: f64,
    pub capital_usd: f64,
}

impl ArbitrageInputs {
    /// Upper bound of the sizing search.
    pub fn size_cap_usd(&self) -> f64 {
        self.capital_usd.max(self.notional_usd).max(0.0)
    }

    /// Reject non-finite or out-of-range fields. Used by the batch surface;
    /// the kernel itself degrades instead of failing.
    pub fn validate(&self) -> Result<(), String> {
        let finite = [
            ("edge_bps", self.edge_bps),
            ("notional_usd", self.notional_usd),
            ("capital_usd", self.capital_usd),
            ("latency_sec", self.latency.latency_sec),
            ("risk_aversion_lambda", self.risk_aversion_lambda),
        ];
        for (name, v) in finite {
            if !v.is_finite() {
                return Err(format!("{name} is not finite"));
            }
        }
        if self.notional_usd < 0.0 || self.capital_usd < 0.0 {
            return Err("negative notional/capital".into());
        }
        for (name, p) in [
            ("fail_before", self.failures.fail_before),
            ("fail_between", self.failures.fail_between),
            ("reorg_or_mev", self.failures.reorg_or_mev),
            ("base_fill_prob", self.latency.base_fill_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{name} outside [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Per-size cost decomposition returned with every result.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub edge_eff_bps: f64,
    /// Gross edge minus router/LP + referral fees, at the chosen size.
    pub after_router_lp_usd: f64,
    pub slip_cost_usd: f64,
    pub gas_usd: f64,
    pub flash_cost_usd: f64,
    pub executor_fee_usd: f64,
    pub seconds: f64,
    /// Set when the evaluator degraded to a zeroed result.
    pub degenerate: bool,
}

/// Output of one evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArbitrageResult {
    /// Probability-weighted expected net USD at the chosen size.
    pub net_usd_est: f64,
    /// Risk-adjusted EV per second; the line-search objective.
    pub ev_per_sec: f64,
    pub size_opt_usd: f64,
    pub p_success: f64,
    pub slip_bps_eff: f64,
    pub breakeven_bps: f64,
    /// Risk-adjusted EV (EV − λ·Var) at the chosen size.
    pub score: f64,
    pub var95: Option<f64>,
    pub cvar95: Option<f64>,
    pub breakdown: CostBreakdown,
}

impl ArbitrageResult {
    /// Zeroed result for numerically degenerate inputs.
    pub fn degenerate(seconds: f64) -> Self {
        Self {
            breakdown: CostBreakdown {
                seconds,
                degenerate: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// A gated, scored, time-bounded signal. One live signal per opportunity id;
/// re-evaluation mutates it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub opportunity: Opportunity,
    pub result: ArbitrageResult,
    pub risk_score: f64,
    pub confidence_score: f64,
    pub priority_score: f64,
    pub should_execute: bool,
    pub valid_until_ms: i64,
    /// Strategy that admitted this signal, if the gate allowed it.
    pub strategy_id: Option<String>,
    /// Gate denial reason; present on non-executable observability signals.
    pub gate_reason: Option<String>,
    pub created_ms: i64,
    pub updated_ms: i64,
}

impl Signal {
    pub fn id(&self) -> &str {
        &self.opportunity.id
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.valid_until_ms
    }
}

/// Signal lifecycle notifications fanned out to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalEvent {
    Created(Signal),
    Updated(Signal),
    Expired { id: String },
    Executed { signal: Signal, actual_profit_usd: f64 },
}
