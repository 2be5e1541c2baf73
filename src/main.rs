// Arbitrage signal engine
// Replays a swap-event capture through the full pipeline and logs signals.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use arb_signal_engine::providers::{Collector, ReplayCollector, StaticPriceOracle};
use arb_signal_engine::strategy::{MemoryStrategyStore, Strategy, StrategyStatus};
use arb_signal_engine::types::{PoolState, TickRecord};
use arb_signal_engine::{load_config, OpportunityKind, SignalEngine, SignalEvent};

use alloy::primitives::Address;
use std::collections::HashMap;

#[derive(Debug, Parser)]
#[command(name = "arb-signal-engine")]
#[command(about = "Real-time arbitrage signal & evaluation engine (replay mode)")]
struct Args {
    /// TOML config profile; defaults + env vars apply without one.
    #[arg(long, env = "ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// JSONL swap-event capture to replay through the pipeline.
    #[arg(long, env = "REPLAY_FILE")]
    replay: PathBuf,

    /// Pool metadata: tracked pools, tick maps, USD token prices.
    #[arg(long, env = "POOLS_FILE")]
    pools: Option<PathBuf>,

    /// Emit JSON-formatted logs.
    #[arg(long)]
    json_logs: bool,
}

/// Sidecar file describing the tracked pools for a replay run.
#[derive(Debug, Default, Deserialize)]
struct PoolsFile {
    #[serde(default)]
    pools: Vec<PoolState>,
    #[serde(default)]
    ticks: HashMap<Address, Vec<TickRecord>>,
    #[serde(default)]
    usd_per_token: HashMap<Address, f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cfg = load_config(args.config.as_deref())?;

    let pools_file = match &args.pools {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading pools file {}", path.display()))?;
            serde_json::from_str::<PoolsFile>(&raw)
                .with_context(|| format!("parsing pools file {}", path.display()))?
        }
        None => PoolsFile::default(),
    };

    let mut oracle = StaticPriceOracle::new(1.0);
    for (token, usd) in &pools_file.usd_per_token {
        oracle = oracle.with_price(*token, *usd);
    }

    // Without a persistent strategy service, every opportunity kind runs
    // under a built-in approved strategy.
    let store = Arc::new(MemoryStrategyStore::new());
    for (id, kind) in [
        ("builtin-direct", OpportunityKind::Direct),
        ("builtin-cross-venue", OpportunityKind::CrossVenue),
        ("builtin-triangular", OpportunityKind::Triangular),
    ] {
        let mut strategy = Strategy::new(id, kind);
        strategy.status = StrategyStatus::Approved;
        store.upsert(strategy);
    }
    info!("seeded built-in approved strategies");

    let engine = SignalEngine::new(cfg, store, Arc::new(oracle), None);
    for state in pools_file.pools {
        let ticks = pools_file.ticks.get(&state.address).cloned().unwrap_or_default();
        engine.seed_pool(state, ticks);
    }

    // Log the signal stream as it goes by.
    let mut signals = engine.subscribe_signals();
    let printer = tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(SignalEvent::Created(s)) => info!(
                    "signal created {} exec={} net=${:.2} priority={:.3}",
                    s.id(),
                    s.should_execute,
                    s.result.net_usd_est,
                    s.priority_score
                ),
                Ok(SignalEvent::Updated(s)) => info!(
                    "signal updated {} exec={} net=${:.2}",
                    s.id(),
                    s.should_execute,
                    s.result.net_usd_est
                ),
                Ok(SignalEvent::Expired { id }) => info!("signal expired {id}"),
                Ok(SignalEvent::Executed { signal, actual_profit_usd }) => info!(
                    "signal executed {} for ${actual_profit_usd:.2}",
                    signal.id()
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("signal printer lagged by {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, cancelling");
            cancel.cancel();
        }
    });

    let collector = ReplayCollector::new(&args.replay);
    let stream = collector
        .event_stream()
        .await
        .context("opening replay stream")?;

    let snapshot = engine.run(stream).await;
    let _ = printer.await;

    info!("final counters: {snapshot}");
    Ok(())
}
