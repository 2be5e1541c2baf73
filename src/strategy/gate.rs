//! Strategy gate: admits or denies execution for an opportunity kind based
//! on approved strategies, and checks backtest coverage on promotion.
//!
//! A denial is a decision, not an error; the coordinator records it as a
//! non-executable signal.

use std::sync::Arc;

use crate::config::GateThresholds;
use crate::error::EngineError;
use crate::strategy::store::{BacktestCoverage, StrategyParams, StrategyStatus, StrategyStore};
use crate::types::OpportunityKind;

pub const REASON_INSUFFICIENT_COVERAGE: &str = "insufficient_coverage_hours";
pub const REASON_P_SUCCESS_BELOW_MIN: &str = "p_success_below_threshold";
pub const REASON_EV_ADJ_BELOW_MIN: &str = "ev_adj_below_threshold";
pub const REASON_DRAWDOWN_ABOVE_MAX: &str = "drawdown_above_threshold";

pub const REASON_NO_APPROVED_STRATEGY: &str = "no_approved_strategy";
pub const REASON_PREFERRED_NOT_FOUND: &str = "preferred_strategy_not_found";
pub const REASON_PREFERRED_NOT_APPROVED: &str = "preferred_strategy_not_approved";

/// Outcome of a gate lookup.
#[derive(Debug, Clone, Default)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason_code: Option<&'static str>,
    pub params: StrategyParams,
    pub strategy_id: Option<String>,
}

impl GateDecision {
    fn denied(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason_code: Some(reason),
            ..Default::default()
        }
    }
}

/// Coverage check applied when a strategy advances out of backtesting.
/// The first failing threshold names the rejection.
pub fn check_approval(
    coverage: &BacktestCoverage,
    thresholds: &GateThresholds,
) -> Result<(), &'static str> {
    if coverage.coverage_hours < thresholds.min_backtest_hours {
        return Err(REASON_INSUFFICIENT_COVERAGE);
    }
    if coverage.p_success < thresholds.min_p_success {
        return Err(REASON_P_SUCCESS_BELOW_MIN);
    }
    if coverage.ev_adj_usd < thresholds.min_ev_adj_usd {
        return Err(REASON_EV_ADJ_BELOW_MIN);
    }
    if coverage.max_drawdown > thresholds.max_drawdown {
        return Err(REASON_DRAWDOWN_ABOVE_MAX);
    }
    Ok(())
}

pub struct StrategyGate {
    store: Arc<dyn StrategyStore>,
}

impl StrategyGate {
    pub fn new(store: Arc<dyn StrategyStore>) -> Self {
        Self { store }
    }

    /// Admit or deny an opportunity kind. A preferred strategy id must exist
    /// and be approved; otherwise the most recently updated approved
    /// strategy for the kind wins.
    pub async fn enforce(
        &self,
        kind: OpportunityKind,
        preferred: Option<&str>,
    ) -> Result<GateDecision, EngineError> {
        if let Some(id) = preferred {
            return Ok(match self.store.get_by_id(id).await? {
                None => GateDecision::denied(REASON_PREFERRED_NOT_FOUND),
                Some(s) if s.status != StrategyStatus::Approved => {
                    GateDecision::denied(REASON_PREFERRED_NOT_APPROVED)
                }
                Some(s) => GateDecision {
                    allowed: true,
                    reason_code: None,
                    params: s.params,
                    strategy_id: Some(s.id),
                },
            });
        }

        let mut approved = self.store.list_approved(kind).await?;
        // Most recently updated first; id as a stable tiebreak.
        approved.sort_by(|a, b| b.updated_ms.cmp(&a.updated_ms).then(a.id.cmp(&b.id)));

        Ok(match approved.into_iter().next() {
            None => GateDecision::denied(REASON_NO_APPROVED_STRATEGY),
            Some(s) => GateDecision {
                allowed: true,
                reason_code: None,
                params: s.params,
                strategy_id: Some(s.id),
            },
        })
    }
}
