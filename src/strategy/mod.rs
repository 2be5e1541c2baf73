//! Strategy records, the store contract, and the execution gate.

pub mod gate;
pub mod store;

pub use gate::{check_approval, GateDecision, StrategyGate};
pub use store::{
    BacktestCoverage, MemoryStrategyStore, Strategy, StrategyParams, StrategyStatus, StrategyStore,
};
