//! Signal coordination: gate → evaluate → score → emit, plus periodic
//! re-evaluation and expiry.
//!
//! The coordinator exclusively owns the active-signal set; it is only ever
//! driven from the single pipeline loop. Subscribers receive lifecycle
//! events over a broadcast channel, with created/updated signals flushed in
//! priority order once per dispatch tick.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CoordinatorConfig, EvalDefaults};
use crate::eval::{EvalOptions, EvaluationService};
use crate::metrics::EngineMetrics;
use crate::pools::{PoolGraph, PriceCache};
use crate::providers::{
    fetch_state_with_retry, fetch_ticks_with_retry, MarketPriceOracle, PoolStateProvider,
};
use crate::signals::scoring;
use crate::strategy::{StrategyGate, StrategyParams};
use crate::types::{
    now_ms, ArbitrageInputs, ArbitrageResult, FailureProbs, FeeSchedule, FrictionCosts,
    LatencyProfile, Opportunity, Signal, SignalEvent, SlippageSpec,
};

const EVENT_CHANNEL_CAPACITY: usize = 512;

pub struct SignalCoordinator {
    cfg: CoordinatorConfig,
    defaults: EvalDefaults,
    gate: StrategyGate,
    eval: EvaluationService,
    graph: PoolGraph,
    cache: PriceCache,
    provider: Option<Arc<dyn PoolStateProvider>>,
    oracle: Arc<dyn MarketPriceOracle>,
    metrics: Arc<EngineMetrics>,

    /// One live signal per opportunity id.
    active: HashMap<String, Signal>,
    /// Merged gate params per live signal, reused on re-evaluation.
    gate_params: HashMap<String, StrategyParams>,
    executed: HashSet<String>,
    /// Created/Updated events buffered for priority-ordered flush.
    pending: Vec<SignalEvent>,
    events_tx: broadcast::Sender<SignalEvent>,
}

impl SignalCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: CoordinatorConfig,
        defaults: EvalDefaults,
        gate: StrategyGate,
        eval: EvaluationService,
        graph: PoolGraph,
        cache: PriceCache,
        provider: Option<Arc<dyn PoolStateProvider>>,
        oracle: Arc<dyn MarketPriceOracle>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            cfg,
            defaults,
            gate,
            eval,
            graph,
            cache,
            provider,
            oracle,
            metrics,
            active: HashMap::new(),
            gate_params: HashMap::new(),
            executed: HashSet::new(),
            pending: Vec::new(),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.events_tx.subscribe()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Read-only copies of the live signals.
    pub fn active_snapshot(&self) -> Vec<Signal> {
        self.active.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Signal> {
        self.active.get(id).cloned()
    }

    /// Process one detected opportunity into a signal (or a recorded
    /// denial). New ids are dropped once the open-signal cap is reached;
    /// known ids re-evaluate in place.
    pub async fn ingest(&mut self, opportunity: Opportunity, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        let id = opportunity.id.clone();

        if self.executed.contains(&id) {
            debug!("{id}: already executed, ignoring");
            return;
        }
        let exists = self.active.contains_key(&id);
        if !exists && self.active.len() >= self.cfg.max_open_signals {
            debug!("{id}: open-signal cap reached, dropping");
            EngineMetrics::incr(&self.metrics.opportunities_dropped);
            return;
        }

        self.hydrate_missing_pools(&opportunity, cancel).await;

        let decision = match self.gate.enforce(opportunity.kind, None).await {
            Ok(d) => d,
            Err(e) => {
                warn!("{id}: gate lookup failed: {e}");
                EngineMetrics::incr(&self.metrics.evaluation_failures);
                return;
            }
        };

        if !decision.allowed {
            let reason = decision.reason_code.unwrap_or("denied");
            debug!("{id}: gate denied ({reason})");
            EngineMetrics::incr(&self.metrics.signals_denied);
            if self.cfg.keep_denied_signals {
                let signal = self.assemble(
                    opportunity,
                    ArbitrageResult::default(),
                    None,
                    Some(reason.to_string()),
                );
                self.store(signal, exists);
            }
            return;
        }

        let params = decision.params;
        let inputs = self.build_inputs(&opportunity, &params);
        let opts = self.eval_options(&params);
        let result = self.eval.evaluate_async(inputs, opts).await;
        if cancel.is_cancelled() {
            return;
        }
        if result.breakdown.degenerate {
            EngineMetrics::incr(&self.metrics.evaluation_failures);
        }

        let signal = self.assemble(opportunity, result, decision.strategy_id, None);
        self.gate_params.insert(id, params);
        self.store(signal, exists);
    }

    /// Re-evaluate every live signal against the latest pool state; expire
    /// the ones past their validity window.
    pub async fn reevaluate(&mut self, cancel: &CancellationToken) {
        let now = now_ms();
        let ids: Vec<String> = self.active.keys().cloned().collect();

        for id in ids {
            if cancel.is_cancelled() {
                break;
            }
            let Some(signal) = self.active.get(&id).cloned() else {
                continue;
            };

            if signal.is_expired(now) {
                self.active.remove(&id);
                self.gate_params.remove(&id);
                EngineMetrics::incr(&self.metrics.signals_expired);
                info!("{id}: expired");
                let _ = self.events_tx.send(SignalEvent::Expired { id });
                continue;
            }

            // Denied signals are observability records; they only age out.
            if signal.gate_reason.is_some() {
                continue;
            }

            let params = self.gate_params.get(&id).copied().unwrap_or_default();
            let inputs = self.build_inputs(&signal.opportunity, &params);
            let opts = self.eval_options(&params);
            let result = self.eval.evaluate_async(inputs, opts).await;

            let mut updated = self.assemble(
                signal.opportunity.clone(),
                result,
                signal.strategy_id.clone(),
                None,
            );
            updated.created_ms = signal.created_ms;
            updated.valid_until_ms = signal.valid_until_ms;
            updated.should_execute = updated.should_execute && !updated.is_expired(now);

            EngineMetrics::incr(&self.metrics.signals_updated);
            self.active.insert(id, updated.clone());
            self.pending.push(SignalEvent::Updated(updated));
        }
        self.flush();
    }

    /// Record an execution: the signal leaves the active set and its id is
    /// permanently retired.
    pub fn mark_executed(&mut self, id: &str, actual_profit_usd: f64) -> bool {
        match self.active.remove(id) {
            Some(signal) => {
                self.gate_params.remove(id);
                self.executed.insert(id.to_string());
                EngineMetrics::incr(&self.metrics.signals_executed);
                info!("{id}: executed for ${actual_profit_usd:.2}");
                let _ = self
                    .events_tx
                    .send(SignalEvent::Executed { signal, actual_profit_usd });
                true
            }
            None => false,
        }
    }

    /// Emit buffered created/updated signals: priority descending, then
    /// older first.
    pub fn flush(&mut self) {
        self.pending.sort_by(|a, b| {
            let (pa, ca) = priority_key(a);
            let (pb, cb) = priority_key(b);
            pb.total_cmp(&pa).then(ca.cmp(&cb))
        });
        for event in self.pending.drain(..) {
            let _ = self.events_tx.send(event);
        }
    }

    // ── Assembly ─────────────────────────────────────────────────────────

    fn assemble(
        &self,
        opportunity: Opportunity,
        result: ArbitrageResult,
        strategy_id: Option<String>,
        gate_reason: Option<String>,
    ) -> Signal {
        let now = now_ms();
        let lambda = self.defaults.risk_aversion_lambda;

        let normalized_var = scoring::normalized_variance(&result, lambda);
        let risk_score = if gate_reason.is_some() {
            1.0
        } else {
            scoring::risk_score(result.p_success, opportunity.competition_level, normalized_var)
        };
        let confidence_score = scoring::confidence_score(opportunity.confidence, &result);
        let priority_score = scoring::priority_score(
            opportunity.profit_usd,
            confidence_score,
            opportunity.latency_budget_ms,
        );

        let should_execute = gate_reason.is_none()
            && result.net_usd_est > self.cfg.min_net_profit_usd
            && risk_score <= self.cfg.max_risk_score
            && confidence_score >= self.cfg.min_confidence;

        Signal {
            opportunity,
            result,
            risk_score,
            confidence_score,
            priority_score,
            should_execute,
            valid_until_ms: now + self.cfg.signal_ttl_ms,
            strategy_id,
            gate_reason,
            created_ms: now,
            updated_ms: now,
        }
    }

    fn store(&mut self, signal: Signal, existed: bool) {
        let id = signal.id().to_string();
        if existed {
            if let Some(prev_created) = self.active.get(&id).map(|p| p.created_ms) {
                let mut merged = signal;
                merged.created_ms = prev_created;
                self.active.insert(id, merged.clone());
                EngineMetrics::incr(&self.metrics.signals_updated);
                self.pending.push(SignalEvent::Updated(merged));
                return;
            }
        }
        self.active.insert(id, signal.clone());
        EngineMetrics::incr(&self.metrics.signals_created);
        self.pending.push(SignalEvent::Created(signal));
    }

    // ── Input construction ───────────────────────────────────────────────

    /// Build kernel inputs from the opportunity, preferring live prices
    /// from the cache and falling back to detection-time values. Gate
    /// params substitute per field; unset fields keep engine defaults.
    fn build_inputs(&self, opp: &Opportunity, params: &StrategyParams) -> ArbitrageInputs {
        let d = &self.defaults;
        let (edge_bps, fees_bps) = self
            .live_edge(opp)
            .unwrap_or((opp.edge_bps, opp.fees_bps));

        let total_fees_bps = params.total_fees_bps.unwrap_or(if fees_bps > 0.0 {
            fees_bps
        } else {
            d.total_fees_bps_default
        });

        ArbitrageInputs {
            edge_bps,
            notional_usd: opp.size_opt_usd,
            fees: FeeSchedule {
                total_fees_bps,
                flash_fee_bps: d.flash_fee_bps,
                referral_bps: d.referral_bps,
                executor_fee_usd: d.executor_fee_usd,
                flash_fixed_usd: d.flash_fixed_usd,
            },
            frictions: FrictionCosts {
                gas_usd_mean: if opp.gas_usd > 0.0 { opp.gas_usd } else { d.gas_usd_mean },
                gas_usd_std: d.gas_usd_std,
                adverse_usd_mean: d.adverse_usd_mean,
                adverse_usd_std: d.adverse_usd_std,
                extra_usd: d.extra_usd,
                mev_penalty_usd: d.mev_penalty_usd,
            },
            latency: LatencyProfile {
                latency_sec: d.latency_sec,
                edge_decay_bps_per_sec: params
                    .edge_decay_bps_per_sec
                    .unwrap_or(d.edge_decay_bps_per_sec),
                base_fill_prob: params.base_fill_prob.unwrap_or(d.base_fill_prob),
                theta: params.fill_theta.unwrap_or(d.fill_theta),
            },
            slippage: self.slippage_spec(opp),
            failures: FailureProbs {
                fail_before: d.fail_before,
                fail_between: d.fail_between,
                reorg_or_mev: d.reorg_or_mev,
            },
            flash_enabled: params.flash_enabled.unwrap_or(d.flash_enabled),
            risk_aversion_lambda: params
                .risk_aversion_lambda
                .unwrap_or(d.risk_aversion_lambda),
            capital_usd: params.max_notional_usd.unwrap_or(d.max_notional_usd),
        }
    }

    /// UniV3-backed slippage from the first hop's live state when tracked;
    /// otherwise the empirical curve against a liquidity reference implied
    /// by the detector's sizing bound.
    fn slippage_spec(&self, opp: &Opportunity) -> SlippageSpec {
        if let Some(hop) = opp.path.first() {
            if let Some(state) = self.graph.get(hop.pool) {
                let token_in = if hop.zero_for_one {
                    state.pair.token0
                } else {
                    state.pair.token1
                };
                return SlippageSpec::UniV3 {
                    sqrt_price_q96: state.sqrt_price_q96,
                    liquidity: state.liquidity,
                    fee_tier_bps: state.fee_tier_bps,
                    tick_spacing: state.tick_spacing,
                    ticks: self.graph.ticks(hop.pool),
                    usd_per_token_in: self.oracle.usd_per_token(token_in),
                    zero_for_one: hop.zero_for_one,
                };
            }
        }
        let liquidity_ref = if opp.max_size_usd > 0.0 {
            opp.max_size_usd * 100.0
        } else {
            1_000_000.0
        };
        SlippageSpec::empirical(self.defaults.slip_k, self.defaults.slip_alpha, liquidity_ref)
    }

    /// Recompute the path edge from fresh price points: the product of
    /// directional per-hop prices. None when any hop's point is missing.
    fn live_edge(&self, opp: &Opportunity) -> Option<(f64, f64)> {
        let mut product = 1.0f64;
        let mut fees_bps = 0.0f64;
        for hop in &opp.path {
            let point = self.cache.get(hop.pool)?;
            let price = if hop.zero_for_one {
                point.price0_to_1
            } else {
                point.price1_to_0
            };
            if price <= 0.0 {
                return None;
            }
            product *= price;
            fees_bps += point.fee_tier_bps as f64;
        }
        Some((((product - 1.0) * 1e4).max(0.0), fees_bps))
    }

    fn eval_options(&self, params: &StrategyParams) -> EvalOptions {
        EvalOptions {
            var_cvar: params.var_cvar.unwrap_or(self.defaults.var_cvar),
            mc_samples: params
                .mc_samples
                .unwrap_or(self.defaults.mc_samples)
                .max(crate::eval::monte_carlo::MIN_SAMPLES),
            seed: None,
        }
    }

    /// Fetch and register path pools the graph does not track yet.
    /// A transient failure only degrades this opportunity's inputs.
    async fn hydrate_missing_pools(&mut self, opp: &Opportunity, cancel: &CancellationToken) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        for hop in &opp.path {
            if cancel.is_cancelled() {
                return;
            }
            if self.graph.contains(hop.pool) {
                continue;
            }
            match fetch_state_with_retry(provider.as_ref(), hop.pool).await {
                Ok(state) => {
                    self.cache.update_from_pool(&state, 0.0, f64::MAX);
                    self.graph.register_pool(state);
                    match fetch_ticks_with_retry(provider.as_ref(), hop.pool).await {
                        Ok(ticks) => self.graph.set_ticks(hop.pool, ticks),
                        Err(e) => warn!("{}: tick fetch failed: {e}", hop.pool),
                    }
                }
                Err(e) => warn!("{}: state fetch failed: {e}", hop.pool),
            }
        }
    }
}

fn priority_key(event: &SignalEvent) -> (f64, i64) {
    match event {
        SignalEvent::Created(s) | SignalEvent::Updated(s) => (s.priority_score, s.created_ms),
        SignalEvent::Expired { .. } => (f64::MAX, 0),
        SignalEvent::Executed { .. } => (f64::MAX, 0),
    }
}
