//! Opportunity evaluation: latency curves, slippage dispatch, payoff tree,
//! the closed-form kernel, Monte-Carlo tail risk, and the batch service.

pub mod kernel;
pub mod latency;
pub mod monte_carlo;
pub mod payoff;
pub mod service;
pub mod slippage;

pub use kernel::evaluate;
pub use service::{
    BatchDefaults, BatchEntry, BatchRequest, BatchResponse, EvalOptions, EvaluationService,
};
