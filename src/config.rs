//! Configuration management.
//!
//! Defaults carry the engine's documented values; an optional TOML profile
//! overrides them wholesale, and individual env vars (loaded via .env)
//! override on top of that.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Detection thresholds and estimates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum cross-venue spread worth emitting.
    pub min_spread_bps: f64,
    /// Pools thinner than this (USD) are ignored for sizing.
    pub min_liquidity_usd: f64,
    /// Maximum hops in a triangular cycle.
    pub max_path_length: usize,
    /// Price points older than this are skipped, not compared.
    pub price_freshness_ms: i64,
    /// Opportunities older than this are evicted by the sweeper.
    pub stale_opportunity_ms: i64,
    pub sweep_interval_ms: u64,
    pub gas_estimate_usd: f64,
    /// Static slippage haircut applied during detection.
    pub slippage_bps_estimate: f64,
    /// Haircut for competing searchers racing the same spread.
    pub competition_discount_bps: f64,
    pub latency_budget_ms: u64,
    /// Fraction of the thinnest pool's USD liquidity used as max size.
    pub max_size_liquidity_fraction: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_spread_bps: 10.0,
            min_liquidity_usd: 10_000.0,
            max_path_length: 3,
            price_freshness_ms: 5_000,
            stale_opportunity_ms: 10_000,
            sweep_interval_ms: 5_000,
            gas_estimate_usd: 0.5,
            slippage_bps_estimate: 5.0,
            competition_discount_bps: 2.0,
            latency_budget_ms: 1_000,
            max_size_liquidity_fraction: 0.01,
        }
    }
}

/// Signal lifecycle thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub min_net_profit_usd: f64,
    pub min_confidence: f64,
    pub max_risk_score: f64,
    pub max_open_signals: usize,
    pub signal_ttl_ms: i64,
    pub reeval_interval_ms: u64,
    /// Record gate-denied signals (shouldExecute = false) for observability.
    pub keep_denied_signals: bool,
    /// Bounded opportunity queue; the oldest entry is dropped on overflow.
    pub opportunity_queue_cap: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_net_profit_usd: 1.0,
            min_confidence: 0.3,
            max_risk_score: 0.7,
            max_open_signals: 32,
            signal_ttl_ms: 5_000,
            reeval_interval_ms: 2_000,
            keep_denied_signals: true,
            opportunity_queue_cap: 256,
        }
    }
}

/// Strategy-approval thresholds enforced by the gate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    pub min_backtest_hours: f64,
    pub min_p_success: f64,
    pub min_ev_adj_usd: f64,
    pub max_drawdown: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_backtest_hours: 24.0,
            min_p_success: 0.75,
            min_ev_adj_usd: 0.0,
            max_drawdown: f64::INFINITY,
        }
    }
}

/// Evaluation parameter defaults applied when an opportunity or strategy
/// does not override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvalDefaults {
    pub edge_decay_bps_per_sec: f64,
    pub base_fill_prob: f64,
    pub fill_theta: f64,
    pub slip_k: f64,
    pub slip_alpha: f64,
    pub total_fees_bps_default: f64,
    pub flash_fee_bps: f64,
    pub referral_bps: f64,
    pub executor_fee_usd: f64,
    pub flash_fixed_usd: f64,
    pub gas_usd_mean: f64,
    pub gas_usd_std: f64,
    pub adverse_usd_mean: f64,
    pub adverse_usd_std: f64,
    pub mev_penalty_usd: f64,
    pub extra_usd: f64,
    pub fail_before: f64,
    pub fail_between: f64,
    pub reorg_or_mev: f64,
    pub flash_enabled: bool,
    pub risk_aversion_lambda: f64,
    pub max_notional_usd: f64,
    pub latency_sec: f64,
    pub var_cvar: bool,
    pub mc_samples: usize,
}

impl Default for EvalDefaults {
    fn default() -> Self {
        Self {
            edge_decay_bps_per_sec: 1.5,
            base_fill_prob: 0.85,
            fill_theta: 0.15,
            slip_k: 0.9,
            slip_alpha: 1.2,
            total_fees_bps_default: 8.0,
            flash_fee_bps: 9.0,
            referral_bps: 0.0,
            executor_fee_usd: 0.0,
            flash_fixed_usd: 0.0,
            gas_usd_mean: 0.2,
            gas_usd_std: 0.05,
            adverse_usd_mean: 0.5,
            adverse_usd_std: 0.25,
            mev_penalty_usd: 1.0,
            extra_usd: 0.0,
            fail_before: 0.02,
            fail_between: 0.01,
            reorg_or_mev: 0.005,
            flash_enabled: false,
            risk_aversion_lambda: 5e-5,
            max_notional_usd: 25_000.0,
            latency_sec: 0.5,
            var_cvar: false,
            mc_samples: 1500,
        }
    }
}

/// Aggregate engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detector: DetectorConfig,
    pub coordinator: CoordinatorConfig,
    pub gate: GateThresholds,
    pub eval: EvalDefaults,
}

/// Load configuration: defaults, then an optional TOML profile, then env
/// overrides for the commonly tuned knobs.
pub fn load_config(profile: Option<&Path>) -> Result<EngineConfig> {
    dotenv::dotenv().ok();

    let mut cfg = match profile {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config profile {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("parsing config profile {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    override_f64("MIN_SPREAD_BPS", &mut cfg.detector.min_spread_bps)?;
    override_f64("MIN_LIQUIDITY_USD", &mut cfg.detector.min_liquidity_usd)?;
    override_f64("GAS_ESTIMATE_USD", &mut cfg.detector.gas_estimate_usd)?;
    override_f64("COMPETITION_DISCOUNT_BPS", &mut cfg.detector.competition_discount_bps)?;
    override_usize("MAX_PATH_LENGTH", &mut cfg.detector.max_path_length)?;

    override_f64("MIN_NET_PROFIT_USD", &mut cfg.coordinator.min_net_profit_usd)?;
    override_f64("MIN_CONFIDENCE", &mut cfg.coordinator.min_confidence)?;
    override_f64("MAX_RISK_SCORE", &mut cfg.coordinator.max_risk_score)?;
    override_usize("MAX_OPEN_SIGNALS", &mut cfg.coordinator.max_open_signals)?;

    override_f64("MIN_BACKTEST_HOURS", &mut cfg.gate.min_backtest_hours)?;
    override_f64("MIN_P_SUCCESS", &mut cfg.gate.min_p_success)?;
    override_f64("MIN_EV_ADJ_USD", &mut cfg.gate.min_ev_adj_usd)?;
    override_f64("MAX_DRAWDOWN", &mut cfg.gate.max_drawdown)?;

    override_f64("RISK_AVERSION_LAMBDA", &mut cfg.eval.risk_aversion_lambda)?;
    override_f64("MAX_NOTIONAL_USD", &mut cfg.eval.max_notional_usd)?;
    override_f64("BASE_FILL_PROB", &mut cfg.eval.base_fill_prob)?;
    override_f64("EDGE_DECAY_BPS_PER_SEC", &mut cfg.eval.edge_decay_bps_per_sec)?;
    override_bool("VAR_CVAR", &mut cfg.eval.var_cvar)?;
    override_usize("MC_SAMPLES", &mut cfg.eval.mc_samples)?;

    Ok(cfg)
}

fn override_f64(name: &str, target: &mut f64) -> Result<()> {
    if let Ok(raw) = std::env::var(name) {
        *target = raw.parse().with_context(|| format!("parsing {name}={raw}"))?;
    }
    Ok(())
}

fn override_usize(name: &str, target: &mut usize) -> Result<()> {
    if let Ok(raw) = std::env::var(name) {
        *target = raw.parse().with_context(|| format!("parsing {name}={raw}"))?;
    }
    Ok(())
}

fn override_bool(name: &str, target: &mut bool) -> Result<()> {
    if let Ok(raw) = std::env::var(name) {
        *target = raw.parse().with_context(|| format!("parsing {name}={raw}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.detector.min_spread_bps, 10.0);
        assert_eq!(cfg.detector.max_path_length, 3);
        assert_eq!(cfg.detector.price_freshness_ms, 5_000);
        assert_eq!(cfg.detector.stale_opportunity_ms, 10_000);
        assert_eq!(cfg.coordinator.signal_ttl_ms, 5_000);
        assert_eq!(cfg.coordinator.reeval_interval_ms, 2_000);
        assert_eq!(cfg.gate.min_backtest_hours, 24.0);
        assert_eq!(cfg.eval.fill_theta, 0.15);
        assert_eq!(cfg.eval.mc_samples, 1500);
    }

    #[test]
    fn toml_profile_overrides_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            [detector]
            min_spread_bps = 25.0

            [coordinator]
            max_open_signals = 8

            [eval]
            var_cvar = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.detector.min_spread_bps, 25.0);
        assert_eq!(cfg.coordinator.max_open_signals, 8);
        assert!(cfg.eval.var_cvar);
        // untouched sections keep defaults
        assert_eq!(cfg.gate.min_p_success, 0.75);
    }
}
