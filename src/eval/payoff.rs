//! State-dependent payoff tree.
//!
//! Five branches: success, fail-before, fail-between, reorg/MEV, and a
//! residual no-op branch with zero payoff. Probabilities are clamped to
//! [0, 1] and normalized so the total never exceeds one.

use crate::types::{FailureProbs, FeeSchedule, FrictionCosts};

/// Fraction of the slippage cost still paid when the trade fails between
/// legs (one leg executed, one abandoned).
const FAIL_BETWEEN_SLIP_FACTOR: f64 = 0.7;

/// Normalized branch probabilities; `noop` absorbs the residual mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchProbs {
    pub success: f64,
    pub fail_before: f64,
    pub fail_between: f64,
    pub reorg_mev: f64,
    pub noop: f64,
}

impl BranchProbs {
    /// Probability mass of the non-idle branches.
    pub fn active_mass(&self) -> f64 {
        self.success + self.fail_before + self.fail_between + self.reorg_mev
    }
}

/// USD payoff per branch at a fixed size; the no-op branch pays zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchPayoffs {
    pub success: f64,
    pub fail_before: f64,
    pub fail_between: f64,
    pub reorg_mev: f64,
}

/// Combine fill probability with the failure modes. Success only happens on
/// a fill that avoids every failure branch; residual mass is the no-op.
pub fn branch_probs(fill_prob: f64, failures: &FailureProbs) -> BranchProbs {
    let fb = clamp01(failures.fail_before);
    let fbw = clamp01(failures.fail_between);
    let rm = clamp01(failures.reorg_or_mev);
    let fill = clamp01(fill_prob);

    let mut success = fill * clamp01(1.0 - fb - fbw - rm);
    let mut fail_before = fb;
    let mut fail_between = fbw;
    let mut reorg_mev = rm;

    let total = success + fail_before + fail_between + reorg_mev;
    if total > 1.0 {
        success /= total;
        fail_before /= total;
        fail_between /= total;
        reorg_mev /= total;
    }

    let noop = (1.0 - (success + fail_before + fail_between + reorg_mev)).max(0.0);
    BranchProbs { success, fail_before, fail_between, reorg_mev, noop }
}

/// Branch payoffs at size `size_usd` with effective edge `edge_eff_bps` and
/// slippage cost `slip_cost_usd`. Gas and adverse enter at their means; the
/// Monte-Carlo engine redraws them per sample.
pub fn branch_payoffs(
    size_usd: f64,
    edge_eff_bps: f64,
    fees: &FeeSchedule,
    frictions: &FrictionCosts,
    slip_cost_usd: f64,
    flash_enabled: bool,
) -> BranchPayoffs {
    let fee_usd = (fees.total_fees_bps + fees.referral_bps) / 1e4 * size_usd
        + fees.executor_fee_usd;
    let flash_usd = flash_cost_usd(size_usd, fees, flash_enabled);
    let gas = frictions.gas_usd_mean;
    let adverse = frictions.adverse_usd_mean;

    BranchPayoffs {
        success: edge_eff_bps / 1e4 * size_usd
            - fee_usd
            - slip_cost_usd
            - gas
            - adverse
            - flash_usd
            - frictions.extra_usd,
        fail_before: -gas,
        fail_between: -FAIL_BETWEEN_SLIP_FACTOR * slip_cost_usd - gas - adverse,
        reorg_mev: -gas - frictions.mev_penalty_usd,
    }
}

/// Flash-loan cost at a given size, zero when flash is disabled.
pub fn flash_cost_usd(size_usd: f64, fees: &FeeSchedule, flash_enabled: bool) -> f64 {
    if flash_enabled {
        fees.flash_fee_bps / 1e4 * size_usd + fees.flash_fixed_usd
    } else {
        0.0
    }
}

/// Probability-weighted expected value over the tree (no-op pays zero).
pub fn expected_value(probs: &BranchProbs, payoffs: &BranchPayoffs) -> f64 {
    probs.success * payoffs.success
        + probs.fail_before * payoffs.fail_before
        + probs.fail_between * payoffs.fail_between
        + probs.reorg_mev * payoffs.reorg_mev
}

/// Mixture variance over the branches plus exogenous gas/adverse dispersion.
pub fn variance(probs: &BranchProbs, payoffs: &BranchPayoffs, frictions: &FrictionCosts) -> f64 {
    let ev = expected_value(probs, payoffs);
    let second_moment = probs.success * payoffs.success * payoffs.success
        + probs.fail_before * payoffs.fail_before * payoffs.fail_before
        + probs.fail_between * payoffs.fail_between * payoffs.fail_between
        + probs.reorg_mev * payoffs.reorg_mev * payoffs.reorg_mev;
    let mixture = (second_moment - ev * ev).max(0.0);
    mixture + frictions.gas_usd_std.powi(2) + frictions.adverse_usd_std.powi(2)
}

fn clamp01(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failures(fb: f64, fbw: f64, rm: f64) -> FailureProbs {
        FailureProbs { fail_before: fb, fail_between: fbw, reorg_or_mev: rm }
    }

    #[test]
    fn probabilities_sum_to_at_most_one() {
        let probs = branch_probs(0.9, &failures(0.4, 0.4, 0.4));
        let total = probs.active_mass() + probs.noop;
        assert!(total <= 1.0 + 1e-12);
        assert!(probs.noop >= 0.0);
    }

    #[test]
    fn full_mass_leaves_no_noop() {
        // fill = 1 and failures that already fill the unit simplex.
        let probs = branch_probs(1.0, &failures(0.2, 0.3, 0.5));
        assert!(probs.noop.abs() < 1e-12);
        assert!(probs.success.abs() < 1e-12);
    }

    #[test]
    fn expected_value_hand_check() {
        let probs = BranchProbs {
            success: 0.5,
            fail_before: 0.2,
            fail_between: 0.0,
            reorg_mev: 0.0,
            noop: 0.3,
        };
        let payoffs = BranchPayoffs {
            success: 10.0,
            fail_before: -1.0,
            fail_between: 0.0,
            reorg_mev: 0.0,
        };
        assert!((expected_value(&probs, &payoffs) - 4.8).abs() < 1e-12);
    }

    #[test]
    fn higher_fees_lower_success_payoff() {
        let frictions = FrictionCosts { gas_usd_mean: 0.2, ..Default::default() };
        let lo = branch_payoffs(
            10_000.0,
            20.0,
            &FeeSchedule { total_fees_bps: 5.0, ..Default::default() },
            &frictions,
            1.0,
            false,
        );
        let hi = branch_payoffs(
            10_000.0,
            20.0,
            &FeeSchedule { total_fees_bps: 30.0, ..Default::default() },
            &frictions,
            1.0,
            false,
        );
        assert!(hi.success < lo.success);
    }

    #[test]
    fn variance_includes_exogenous_dispersion() {
        let probs = branch_probs(1.0, &failures(0.0, 0.0, 0.0));
        let payoffs = BranchPayoffs {
            success: 5.0,
            fail_before: 0.0,
            fail_between: 0.0,
            reorg_mev: 0.0,
        };
        let quiet = FrictionCosts::default();
        let noisy = FrictionCosts { gas_usd_std: 2.0, adverse_usd_std: 1.0, ..Default::default() };
        let base = variance(&probs, &payoffs, &quiet);
        assert!((variance(&probs, &payoffs, &noisy) - base - 5.0).abs() < 1e-12);
    }

    #[test]
    fn flash_cost_only_when_enabled() {
        let fees = FeeSchedule {
            flash_fee_bps: 9.0,
            flash_fixed_usd: 0.5,
            ..Default::default()
        };
        assert_eq!(flash_cost_usd(10_000.0, &fees, false), 0.0);
        assert!((flash_cost_usd(10_000.0, &fees, true) - 9.5).abs() < 1e-12);
    }
}
