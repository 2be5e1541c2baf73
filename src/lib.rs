//! Real-time arbitrage signal & evaluation engine.
//!
//! Consumes a swap-event stream over concentrated-liquidity pools, detects
//! cross-venue and triangular candidates, evaluates them under fee,
//! slippage, latency, and failure models, and emits ranked, time-bounded,
//! strategy-gated signals.

pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod eval;
pub mod math;
pub mod metrics;
pub mod pools;
pub mod providers;
pub mod signals;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use config::{load_config, EngineConfig};
pub use engine::SignalEngine;
pub use error::EngineError;
pub use eval::{BatchRequest, BatchResponse, EvaluationService};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use types::{
    ArbitrageInputs, ArbitrageResult, Opportunity, OpportunityKind, PoolState, Signal,
    SignalEvent, SwapEvent,
};
