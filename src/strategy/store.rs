//! Strategy records and the store contract.
//!
//! Strategies advance Draft → Backtesting → Approved/Rejected → Archived.
//! The engine consumes them read-only through [`StrategyStore`]; the
//! in-memory implementation backs tests and offline runs, with persistence
//! delegated to an external service.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GateThresholds;
use crate::error::EngineError;
use crate::strategy::gate;
use crate::types::{now_ms, OpportunityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Draft,
    Backtesting,
    Approved,
    Rejected,
    Archived,
}

/// Per-field evaluation overrides carried by an approved strategy.
/// Unset fields leave the engine defaults untouched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub risk_aversion_lambda: Option<f64>,
    pub max_notional_usd: Option<f64>,
    pub total_fees_bps: Option<f64>,
    pub base_fill_prob: Option<f64>,
    pub edge_decay_bps_per_sec: Option<f64>,
    pub fill_theta: Option<f64>,
    pub flash_enabled: Option<bool>,
    pub var_cvar: Option<bool>,
    pub mc_samples: Option<usize>,
}

/// Backtest coverage metrics examined by the approval check.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BacktestCoverage {
    pub coverage_hours: f64,
    pub p_success: f64,
    pub ev_adj_usd: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub kind: OpportunityKind,
    pub status: StrategyStatus,
    pub params: StrategyParams,
    pub coverage: BacktestCoverage,
    pub approved_at_ms: Option<i64>,
    pub updated_ms: i64,
    pub rejection_reason: Option<String>,
}

impl Strategy {
    pub fn new(id: impl Into<String>, kind: OpportunityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: StrategyStatus::Draft,
            params: StrategyParams::default(),
            coverage: BacktestCoverage::default(),
            approved_at_ms: None,
            updated_ms: now_ms(),
            rejection_reason: None,
        }
    }
}

/// Read surface the gate depends on.
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn list_approved(&self, kind: OpportunityKind) -> Result<Vec<Strategy>, EngineError>;
    async fn get_by_id(&self, id: &str) -> Result<Option<Strategy>, EngineError>;
}

/// In-memory store with the promotion state machine.
#[derive(Debug, Default)]
pub struct MemoryStrategyStore {
    strategies: RwLock<HashMap<String, Strategy>>,
}

impl MemoryStrategyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, strategy: Strategy) {
        self.strategies
            .write()
            .expect("strategy store lock poisoned")
            .insert(strategy.id.clone(), strategy);
    }

    /// Advance a strategy out of backtesting: the approval check either
    /// approves it or rejects it with a specific reason code.
    pub fn promote(
        &self,
        id: &str,
        thresholds: &GateThresholds,
    ) -> Result<StrategyStatus, EngineError> {
        let mut strategies = self.strategies.write().expect("strategy store lock poisoned");
        let strategy = strategies
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("strategy {id}")))?;

        match gate::check_approval(&strategy.coverage, thresholds) {
            Ok(()) => {
                strategy.status = StrategyStatus::Approved;
                strategy.approved_at_ms = Some(now_ms());
                strategy.rejection_reason = None;
            }
            Err(reason) => {
                strategy.status = StrategyStatus::Rejected;
                strategy.rejection_reason = Some(reason.to_string());
            }
        }
        strategy.updated_ms = now_ms();
        Ok(strategy.status)
    }

    pub fn get(&self, id: &str) -> Option<Strategy> {
        self.strategies
            .read()
            .expect("strategy store lock poisoned")
            .get(id)
            .cloned()
    }
}

#[async_trait]
impl StrategyStore for MemoryStrategyStore {
    async fn list_approved(&self, kind: OpportunityKind) -> Result<Vec<Strategy>, EngineError> {
        let strategies = self.strategies.read().expect("strategy store lock poisoned");
        Ok(strategies
            .values()
            .filter(|s| s.status == StrategyStatus::Approved && s.kind == kind)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Strategy>, EngineError> {
        Ok(self.get(id))
    }
}
