//! Signal scoring: risk, confidence, and dispatch priority.

use crate::types::ArbitrageResult;

/// Cap on the EV/sec boost applied to the confidence score.
const EV_PER_SEC_BOOST_REF: f64 = 10.0;

/// Multiplier applied when tail losses dwarf the expected outcome.
const CVAR_PENALTY: f64 = 0.8;

/// riskScore = 0.4·(1−pSuccess) + 0.3·competition + 0.3·normalizedVariance,
/// clamped to [0, 1].
pub fn risk_score(p_success: f64, competition_level: f64, normalized_variance: f64) -> f64 {
    let score = 0.4 * (1.0 - p_success.clamp(0.0, 1.0))
        + 0.3 * competition_level.clamp(0.0, 1.0)
        + 0.3 * normalized_variance.clamp(0.0, 1.0);
    score.clamp(0.0, 1.0)
}

/// Dispersion relative to the expected outcome, in [0, 1): σ/(σ + EV⁺ + 1).
/// The variance is recovered from the kernel's risk adjustment
/// (score = EV − λ·Var); a zero lambda reports zero dispersion.
pub fn normalized_variance(result: &ArbitrageResult, risk_aversion_lambda: f64) -> f64 {
    if risk_aversion_lambda <= 0.0 {
        return 0.0;
    }
    let variance = ((result.net_usd_est - result.score) / risk_aversion_lambda).max(0.0);
    let sigma = variance.sqrt();
    sigma / (sigma + result.net_usd_est.max(0.0) + 1.0)
}

/// confidenceScore = opportunity confidence · boost, where the boost mildly
/// rewards high EV/sec and an oversized CVaR tail costs a 0.8× penalty.
pub fn confidence_score(opportunity_confidence: f64, result: &ArbitrageResult) -> f64 {
    let boost = 1.0 + 0.1 * (result.ev_per_sec.max(0.0) / EV_PER_SEC_BOOST_REF).min(1.0);
    let mut score = opportunity_confidence.clamp(0.0, 1.0) * boost;

    if let Some(cvar) = result.cvar95 {
        if cvar < 0.0 && cvar.abs() > 0.5 * result.net_usd_est.max(0.0) {
            score *= CVAR_PENALTY;
        }
    }
    score.clamp(0.0, 1.0)
}

/// priorityScore = 0.5·min(profit/100, 1) + 0.3·confidence + 0.2·urgency,
/// with urgency = 1/(1 + latencyBudgetMs/1000).
pub fn priority_score(profit_usd: f64, confidence: f64, latency_budget_ms: u64) -> f64 {
    let urgency = 1.0 / (1.0 + latency_budget_ms as f64 / 1000.0);
    0.5 * (profit_usd.max(0.0) / 100.0).min(1.0)
        + 0.3 * confidence.clamp(0.0, 1.0)
        + 0.2 * urgency
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(net: f64, score: f64, ev_per_sec: f64, cvar: Option<f64>) -> ArbitrageResult {
        ArbitrageResult {
            net_usd_est: net,
            score,
            ev_per_sec,
            cvar95: cvar,
            ..Default::default()
        }
    }

    #[test]
    fn risk_score_bounds() {
        assert_eq!(risk_score(1.0, 0.0, 0.0), 0.0);
        assert_eq!(risk_score(0.0, 1.0, 1.0), 1.0);
        let mid = risk_score(0.5, 0.5, 0.5);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn riskier_outcomes_score_higher() {
        let safe = risk_score(0.9, 0.1, 0.1);
        let risky = risk_score(0.5, 0.6, 0.5);
        assert!(risky > safe);
    }

    #[test]
    fn normalized_variance_rises_with_dispersion() {
        // net − score = λ·Var: bigger gap means bigger variance.
        let tight = normalized_variance(&result(5.0, 4.999, 0.0, None), 1e-4);
        let loose = normalized_variance(&result(5.0, 4.0, 0.0, None), 1e-4);
        assert!(loose > tight);
        assert!((0.0..1.0).contains(&loose));
    }

    #[test]
    fn zero_lambda_reports_zero_dispersion() {
        assert_eq!(normalized_variance(&result(5.0, 1.0, 0.0, None), 0.0), 0.0);
    }

    #[test]
    fn ev_boost_is_mild_and_capped() {
        let flat = confidence_score(0.5, &result(1.0, 1.0, 0.0, None));
        let boosted = confidence_score(0.5, &result(1.0, 1.0, 50.0, None));
        assert!(boosted > flat);
        assert!(boosted <= 0.5 * 1.1 + 1e-12);
    }

    #[test]
    fn heavy_tail_costs_a_penalty() {
        let clean = confidence_score(0.8, &result(4.0, 4.0, 0.0, Some(-1.0)));
        let heavy = confidence_score(0.8, &result(4.0, 4.0, 0.0, Some(-3.0)));
        assert!((heavy / clean - CVAR_PENALTY).abs() < 1e-9);
    }

    #[test]
    fn priority_prefers_fat_fast_confident() {
        let hot = priority_score(150.0, 0.9, 200);
        let cold = priority_score(5.0, 0.3, 5_000);
        assert!(hot > cold);
        // Profit component saturates at $100.
        assert_eq!(priority_score(100.0, 0.5, 1_000), priority_score(500.0, 0.5, 1_000));
    }
}
