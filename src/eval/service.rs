//! Evaluation service: single and batch evaluation, plus the externally
//! visible batch wire format.
//!
//! Batch semantics: per-item validation failures become per-item error
//! entries in positional order; only a malformed envelope aborts a request.

use serde::{Deserialize, Serialize};

use crate::eval::{kernel, monte_carlo};
use crate::types::{ArbitrageInputs, ArbitrageResult};

/// Sample counts above this are dispatched to the blocking pool instead of
/// running inline on the cooperative loop.
const INLINE_SAMPLE_THRESHOLD: usize = 2000;

/// Per-evaluation options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalOptions {
    /// Attach VaR/CVaR estimates from a Monte-Carlo pass.
    pub var_cvar: bool,
    pub mc_samples: usize,
    /// Deterministic sampling seed; derived from inputs when absent.
    pub seed: Option<u64>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            var_cvar: false,
            mc_samples: monte_carlo::DEFAULT_SAMPLES,
            seed: None,
        }
    }
}

/// Batch request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<ArbitrageInputs>,
    #[serde(default)]
    pub defaults: Option<BatchDefaults>,
}

/// Optional per-request parameter defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchDefaults {
    pub var_cvar: Option<bool>,
    pub mc_samples: Option<usize>,
    pub seed: Option<u64>,
}

/// One positional batch entry: a result, or a per-item error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Result(Box<ArbitrageResult>),
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub items: Vec<BatchEntry>,
}

/// Stateless evaluation front-end around the kernel and the Monte-Carlo
/// sampler.
#[derive(Debug, Clone, Default)]
pub struct EvaluationService {
    opts: EvalOptions,
}

impl EvaluationService {
    pub fn new(opts: EvalOptions) -> Self {
        Self { opts }
    }

    /// Evaluate with the service's default options.
    pub fn evaluate(&self, inputs: &ArbitrageInputs) -> ArbitrageResult {
        self.evaluate_with(inputs, &self.opts)
    }

    /// Evaluate with explicit options.
    pub fn evaluate_with(&self, inputs: &ArbitrageInputs, opts: &EvalOptions) -> ArbitrageResult {
        let mut result = kernel::evaluate(inputs);
        if opts.var_cvar && !result.breakdown.degenerate {
            attach_tail_risk(&mut result, inputs, opts);
        }
        result
    }

    /// Async evaluation; large Monte-Carlo batches run on the blocking pool
    /// so the cooperative pipeline loop is never starved.
    pub async fn evaluate_async(&self, inputs: ArbitrageInputs, opts: EvalOptions) -> ArbitrageResult {
        if opts.var_cvar && opts.mc_samples > INLINE_SAMPLE_THRESHOLD {
            let service = self.clone();
            let seconds = inputs.latency.latency_sec.max(0.0);
            tokio::task::spawn_blocking(move || service.evaluate_with(&inputs, &opts))
                .await
                .unwrap_or_else(|_| ArbitrageResult::degenerate(seconds))
        } else {
            self.evaluate_with(&inputs, &opts)
        }
    }

    /// Evaluate a batch, preserving item order. Invalid items yield error
    /// entries; the rest of the batch proceeds.
    pub fn evaluate_batch(&self, request: &BatchRequest) -> BatchResponse {
        let opts = self.merge_defaults(request.defaults.as_ref());
        let items = request
            .items
            .iter()
            .map(|inputs| match inputs.validate() {
                Ok(()) => BatchEntry::Result(Box::new(self.evaluate_with(inputs, &opts))),
                Err(msg) => BatchEntry::Error { error: msg },
            })
            .collect();
        BatchResponse { items }
    }

    fn merge_defaults(&self, defaults: Option<&BatchDefaults>) -> EvalOptions {
        let mut opts = self.opts;
        if let Some(d) = defaults {
            if let Some(v) = d.var_cvar {
                opts.var_cvar = v;
            }
            if let Some(n) = d.mc_samples {
                opts.mc_samples = n.max(monte_carlo::MIN_SAMPLES);
            }
            if d.seed.is_some() {
                opts.seed = d.seed;
            }
        }
        opts
    }
}

fn attach_tail_risk(result: &mut ArbitrageResult, inputs: &ArbitrageInputs, opts: &EvalOptions) {
    let samples =
        monte_carlo::sample_payoffs(inputs, result.size_opt_usd, opts.mc_samples, opts.seed);
    let (var, cvar) = monte_carlo::var_cvar(&samples, monte_carlo::DEFAULT_ALPHA);
    result.var95 = Some(var);
    result.cvar95 = Some(cvar);
}
