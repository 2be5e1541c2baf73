//! Closed-form evaluation kernel.
//!
//! Computes the latency-decayed edge and branch probabilities once, then
//! line-searches the notional size for the best risk-adjusted EV per second.
//! Pure and total: numerically degenerate inputs produce a zeroed result
//! with the diagnostic flag set, never an error.

use crate::eval::{latency, payoff, slippage};
use crate::types::{ArbitrageInputs, ArbitrageResult, CostBreakdown};

/// Number of candidate sizes, uniformly spaced in (0, cap].
const LINE_SEARCH_POINTS: usize = 12;

/// Floor on the per-second divisor so sub-millisecond latencies do not
/// explode the score.
const MIN_SECONDS: f64 = 1e-3;

/// Evaluate one opportunity. See module docs; ties in the size search
/// prefer the smaller size, then the smaller breakeven.
pub fn evaluate(inputs: &ArbitrageInputs) -> ArbitrageResult {
    let seconds = inputs.latency.latency_sec.max(0.0);
    let cap = inputs.size_cap_usd();

    let edge_eff_bps = latency::edge_decay(
        inputs.edge_bps,
        seconds,
        inputs.latency.edge_decay_bps_per_sec,
    );
    let fill = latency::fill_prob(inputs.latency.base_fill_prob, seconds, inputs.latency.theta);
    let probs = payoff::branch_probs(fill, &inputs.failures);

    if cap <= 0.0 || probs.active_mass() <= 0.0 {
        return ArbitrageResult::degenerate(seconds);
    }

    struct Candidate {
        size: f64,
        slip_bps: f64,
        ev: f64,
        ev_adj: f64,
        score: f64,
        breakeven_bps: f64,
    }
    let mut best: Option<Candidate> = None;

    for i in 1..=LINE_SEARCH_POINTS {
        let size = cap * i as f64 / LINE_SEARCH_POINTS as f64;
        let slip_bps = slippage::effective_slip_bps(&inputs.slippage, size);
        let slip_cost = slip_bps / 1e4 * size;

        let payoffs = payoff::branch_payoffs(
            size,
            edge_eff_bps,
            &inputs.fees,
            &inputs.frictions,
            slip_cost,
            inputs.flash_enabled,
        );
        let ev = payoff::expected_value(&probs, &payoffs);
        let var = payoff::variance(&probs, &payoffs, &inputs.frictions);
        let ev_adj = ev - inputs.risk_aversion_lambda * var;
        let score = ev_adj / seconds.max(MIN_SECONDS);
        let breakeven_bps = breakeven(inputs, size, slip_bps);

        let candidate = Candidate { size, slip_bps, ev, ev_adj, score, breakeven_bps };
        let better = match &best {
            None => true,
            Some(b) => {
                candidate.score > b.score
                    || (candidate.score == b.score
                        && (candidate.size < b.size
                            || (candidate.size == b.size
                                && candidate.breakeven_bps < b.breakeven_bps)))
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    // cap > 0 guarantees at least one candidate.
    let best = match best {
        Some(b) => b,
        None => return ArbitrageResult::degenerate(seconds),
    };

    let flash_usd = payoff::flash_cost_usd(best.size, &inputs.fees, inputs.flash_enabled);
    ArbitrageResult {
        net_usd_est: best.ev,
        ev_per_sec: best.score,
        size_opt_usd: best.size,
        p_success: probs.success,
        slip_bps_eff: best.slip_bps,
        breakeven_bps: best.breakeven_bps,
        score: best.ev_adj,
        var95: None,
        cvar95: None,
        breakdown: CostBreakdown {
            edge_eff_bps,
            after_router_lp_usd: (edge_eff_bps
                - inputs.fees.total_fees_bps
                - inputs.fees.referral_bps)
                / 1e4
                * best.size,
            slip_cost_usd: best.slip_bps / 1e4 * best.size,
            gas_usd: inputs.frictions.gas_usd_mean,
            flash_cost_usd: flash_usd,
            executor_fee_usd: inputs.fees.executor_fee_usd,
            seconds,
            degenerate: false,
        },
    }
}

/// Edge required for zero expected net at `size`: variable costs in bps plus
/// fixed costs amortized over the size.
fn breakeven(inputs: &ArbitrageInputs, size: f64, slip_bps: f64) -> f64 {
    let fixed_usd = inputs.frictions.gas_usd_mean
        + inputs.frictions.adverse_usd_mean
        + payoff::flash_cost_usd(size, &inputs.fees, inputs.flash_enabled)
        + inputs.frictions.extra_usd;
    let amortized_bps = if size > 0.0 { fixed_usd / size * 1e4 } else { 0.0 };
    (slip_bps + inputs.fees.total_fees_bps + amortized_bps).max(0.0)
}
