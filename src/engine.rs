//! Pipeline wiring.
//!
//! One cooperative loop drains the swap-event stream in arrival order and
//! interleaves the background timers (eviction sweep, signal re-evaluation)
//! via select. All shared-state mutation happens on this loop; opportunities
//! found for an event are fully coordinated before the next event is drained.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::detect::OpportunityDetector;
use crate::eval::{EvalOptions, EvaluationService};
use crate::math::fixed_point;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::pools::{PoolGraph, PriceCache, SwapApply};
use crate::providers::{
    fetch_state_with_retry, fetch_ticks_with_retry, CollectorStream, MarketPriceOracle,
    PoolStateProvider,
};
use crate::signals::SignalCoordinator;
use crate::strategy::{StrategyGate, StrategyStore};
use crate::types::{Opportunity, PoolState, SignalEvent, SwapEvent, TickRecord};

const OPPORTUNITY_CHANNEL_CAPACITY: usize = 512;

pub struct SignalEngine {
    cfg: EngineConfig,
    graph: PoolGraph,
    cache: PriceCache,
    detector: OpportunityDetector,
    coordinator: SignalCoordinator,
    oracle: Arc<dyn MarketPriceOracle>,
    provider: Option<Arc<dyn PoolStateProvider>>,
    metrics: Arc<EngineMetrics>,
    opportunities_tx: broadcast::Sender<Opportunity>,
    /// Bounded hand-off between detection and coordination; the oldest
    /// entry is dropped on overflow.
    queue: VecDeque<Opportunity>,
    cancel: CancellationToken,
}

impl SignalEngine {
    pub fn new(
        cfg: EngineConfig,
        store: Arc<dyn StrategyStore>,
        oracle: Arc<dyn MarketPriceOracle>,
        provider: Option<Arc<dyn PoolStateProvider>>,
    ) -> Self {
        let metrics = Arc::new(EngineMetrics::new());
        let graph = PoolGraph::new();
        let cache = PriceCache::new();

        let detector = OpportunityDetector::new(
            cfg.detector.clone(),
            graph.clone(),
            cache.clone(),
            Arc::clone(&oracle),
        );
        let eval = EvaluationService::new(EvalOptions {
            var_cvar: cfg.eval.var_cvar,
            mc_samples: cfg.eval.mc_samples,
            seed: None,
        });
        let coordinator = SignalCoordinator::new(
            cfg.coordinator.clone(),
            cfg.eval.clone(),
            StrategyGate::new(store),
            eval,
            graph.clone(),
            cache.clone(),
            provider.clone(),
            Arc::clone(&oracle),
            Arc::clone(&metrics),
        );

        let (opportunities_tx, _) = broadcast::channel(OPPORTUNITY_CHANNEL_CAPACITY);

        Self {
            cfg,
            graph,
            cache,
            detector,
            coordinator,
            oracle,
            provider,
            metrics,
            opportunities_tx,
            queue: VecDeque::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token used to stop the pipeline; the loop finishes the in-flight
    /// event before exiting.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Lazy stream of signal lifecycle events.
    pub fn subscribe_signals(&self) -> broadcast::Receiver<SignalEvent> {
        self.coordinator.subscribe()
    }

    /// Lazy stream of detected opportunities.
    pub fn subscribe_opportunities(&self) -> broadcast::Receiver<Opportunity> {
        self.opportunities_tx.subscribe()
    }

    /// Pre-register a pool (and its tick map) ahead of the event stream,
    /// e.g. from a pools file in replay runs.
    pub fn seed_pool(&self, state: PoolState, ticks: Vec<TickRecord>) {
        self.cache.update_from_pool(&state, 0.0, f64::MAX);
        self.graph.set_ticks(state.address, ticks);
        self.graph.register_pool(state);
    }

    pub fn mark_executed(&mut self, id: &str, actual_profit_usd: f64) -> bool {
        self.coordinator.mark_executed(id, actual_profit_usd)
    }

    /// Drive the pipeline until the stream ends or cancellation fires.
    /// Returns the final metrics snapshot.
    pub async fn run(mut self, mut events: CollectorStream<'_, SwapEvent>) -> MetricsSnapshot {
        let mut sweep =
            tokio::time::interval(Duration::from_millis(self.cfg.detector.sweep_interval_ms.max(1)));
        let mut reeval = tokio::time::interval(Duration::from_millis(
            self.cfg.coordinator.reeval_interval_ms.max(1),
        ));
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        reeval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let cancel = self.cancel.clone();
        info!("signal engine running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancellation requested, shutting down");
                    break;
                }
                maybe = events.next() => match maybe {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("event stream ended");
                        break;
                    }
                },
                _ = sweep.tick() => {
                    self.detector.sweep(crate::types::now_ms());
                }
                _ = reeval.tick() => {
                    self.coordinator.reevaluate(&self.cancel).await;
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        info!("signal engine stopped: {snapshot}");
        snapshot
    }

    async fn handle_event(&mut self, event: SwapEvent) {
        EngineMetrics::incr(&self.metrics.events_processed);

        let (old, new) = match self.graph.apply_swap(&event) {
            SwapApply::Updated { old, new } => (old, new),
            SwapApply::Unknown => match self.register_unknown_pool(&event).await {
                Some(states) => states,
                None => return,
            },
        };
        if new.tick != event.tick {
            // The graph re-derived the tick from the sqrt price.
            EngineMetrics::incr(&self.metrics.fatal_errors);
        }

        let impact_bps = price_impact_bps(&old, &new);
        let trade_size_usd = self.trade_size_usd(&event, &new);
        self.cache.update_from_pool(&new, impact_bps, trade_size_usd);

        let found = self.detector.on_swap(event.pool, event.timestamp_ms);
        for opp in found {
            EngineMetrics::incr(&self.metrics.opportunities_detected);
            let _ = self.opportunities_tx.send(opp.clone());
            if self.queue.len() >= self.cfg.coordinator.opportunity_queue_cap {
                self.queue.pop_front();
                EngineMetrics::incr(&self.metrics.opportunities_dropped);
                debug!("opportunity queue full, dropped oldest");
            }
            self.queue.push_back(opp);
        }

        while let Some(opp) = self.queue.pop_front() {
            if self.cancel.is_cancelled() {
                break;
            }
            self.coordinator.ingest(opp, &self.cancel).await;
        }
        self.coordinator.flush();
    }

    /// First observation of a pool: pull full state (and ticks) from the
    /// provider, then re-apply the event against it.
    async fn register_unknown_pool(&mut self, event: &SwapEvent) -> Option<(PoolState, PoolState)> {
        let provider = match &self.provider {
            Some(p) => Arc::clone(p),
            None => {
                debug!("{}: unknown pool and no state provider, skipping", event.pool);
                return None;
            }
        };

        match fetch_state_with_retry(provider.as_ref(), event.pool).await {
            Ok(state) => {
                match fetch_ticks_with_retry(provider.as_ref(), event.pool).await {
                    Ok(ticks) => self.graph.set_ticks(event.pool, ticks),
                    Err(e) => warn!("{}: tick fetch failed: {e}", event.pool),
                }
                self.graph.register_pool(state);
            }
            Err(e) => {
                warn!("{}: state fetch failed, dropping event: {e}", event.pool);
                return None;
            }
        }

        match self.graph.apply_swap(event) {
            SwapApply::Updated { old, new } => Some((old, new)),
            SwapApply::Unknown => None,
        }
    }

    /// USD notional of the swap, taken as the larger side of the trade
    /// (18-decimal tokens assumed).
    fn trade_size_usd(&self, event: &SwapEvent, state: &PoolState) -> f64 {
        let usd0 = fixed_point::u256_to_f64(event.amount0.unsigned_abs()) / 1e18
            * self.oracle.usd_per_token(state.pair.token0);
        let usd1 = fixed_point::u256_to_f64(event.amount1.unsigned_abs()) / 1e18
            * self.oracle.usd_per_token(state.pair.token1);
        usd0.max(usd1)
    }
}

/// |Δ mid price| relative to the pre-swap price, in bps.
fn price_impact_bps(old: &PoolState, new: &PoolState) -> f64 {
    let before = old.price0_to_1();
    let after = new.price0_to_1();
    if before <= 0.0 {
        return 0.0;
    }
    ((after - before) / before).abs() * 1e4
}
