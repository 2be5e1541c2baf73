//! Collaborator contracts: pool state, USD pricing, and the swap event
//! collector, plus a JSONL replay collector for offline runs and tests.
//!
//! The engine never talks to an RPC endpoint directly; everything external
//! comes through these traits.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio_stream::Stream;
use tracing::warn;

use crate::error::{with_retry, EngineError};
use crate::types::{PoolState, SwapEvent, TickRecord};

/// A stream of events emitted by a collector.
pub type CollectorStream<'a, E> = Pin<Box<dyn Stream<Item = E> + Send + 'a>>;

/// Turns an external feed into an ordered internal event stream.
#[async_trait]
pub trait Collector<E>: Send + Sync {
    async fn event_stream(&self) -> Result<CollectorStream<'_, E>, EngineError>;
}

/// Source of pool snapshots and tick maps.
#[async_trait]
pub trait PoolStateProvider: Send + Sync {
    async fn fetch_state(&self, pool: Address) -> Result<PoolState, EngineError>;

    /// Sorted tick records; an empty map degrades simulation to no-cross.
    async fn fetch_ticks(&self, pool: Address) -> Result<Vec<TickRecord>, EngineError>;
}

/// USD value per whole token. Implementations are expected to answer from a
/// local cache; this is called on the hot path.
pub trait MarketPriceOracle: Send + Sync {
    fn usd_per_token(&self, token: Address) -> f64;
}

/// Fixed-price oracle backed by a map, with a fallback for unknown tokens.
#[derive(Debug, Clone)]
pub struct StaticPriceOracle {
    prices: HashMap<Address, f64>,
    default_usd: f64,
}

impl StaticPriceOracle {
    pub fn new(default_usd: f64) -> Self {
        Self { prices: HashMap::new(), default_usd }
    }

    pub fn with_price(mut self, token: Address, usd: f64) -> Self {
        self.prices.insert(token, usd);
        self
    }
}

impl MarketPriceOracle for StaticPriceOracle {
    fn usd_per_token(&self, token: Address) -> f64 {
        self.prices.get(&token).copied().unwrap_or(self.default_usd)
    }
}

/// Fetch a pool snapshot with timeout + retry.
pub async fn fetch_state_with_retry(
    provider: &dyn PoolStateProvider,
    pool: Address,
) -> Result<PoolState, EngineError> {
    with_retry("fetch_state", || provider.fetch_state(pool)).await
}

/// Fetch a tick map with timeout + retry.
pub async fn fetch_ticks_with_retry(
    provider: &dyn PoolStateProvider,
    pool: Address,
) -> Result<Vec<TickRecord>, EngineError> {
    with_retry("fetch_ticks", || provider.fetch_ticks(pool)).await
}

/// Replays swap events from a JSONL capture at full speed. Malformed lines
/// are logged and skipped; the stream keeps going.
#[derive(Debug, Clone)]
pub struct ReplayCollector {
    path: PathBuf,
}

impl ReplayCollector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Collector<SwapEvent> for ReplayCollector {
    async fn event_stream(&self) -> Result<CollectorStream<'_, SwapEvent>, EngineError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EngineError::Transient(format!("reading {}: {e}", self.path.display())))?;

        let events: Vec<SwapEvent> = raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("replay line {}: skipping malformed event: {e}", n + 1);
                    None
                }
            })
            .collect();

        Ok(Box::pin(tokio_stream::iter(events)))
    }
}
