//! End-to-end scenarios with literal inputs, driven through the public API.

use std::sync::Arc;

use alloy::primitives::{Address, U256};

use arb_signal_engine::config::{DetectorConfig, GateThresholds};
use arb_signal_engine::detect::OpportunityDetector;
use arb_signal_engine::eval::{evaluate, slippage::effective_slip_bps};
use arb_signal_engine::math::fixed_point::{sqrt_q96_at_tick, Q96};
use arb_signal_engine::pools::{PoolGraph, PriceCache};
use arb_signal_engine::providers::StaticPriceOracle;
use arb_signal_engine::strategy::{
    gate, BacktestCoverage, MemoryStrategyStore, Strategy, StrategyStatus,
};
use arb_signal_engine::types::{
    ArbitrageInputs, FailureProbs, FeeSchedule, FrictionCosts, LatencyProfile, OpportunityKind,
    PoolState, SlippageSpec, TokenPair,
};

fn scenario_inputs(edge_bps: f64, latency_sec: f64) -> ArbitrageInputs {
    ArbitrageInputs {
        edge_bps,
        notional_usd: 10_000.0,
        fees: FeeSchedule { total_fees_bps: 8.0, ..Default::default() },
        frictions: FrictionCosts {
            gas_usd_mean: 0.2,
            gas_usd_std: 0.0,
            adverse_usd_mean: 0.5,
            adverse_usd_std: 0.0,
            extra_usd: 0.0,
            mev_penalty_usd: 0.0,
        },
        latency: LatencyProfile {
            latency_sec,
            edge_decay_bps_per_sec: 1.5,
            base_fill_prob: 0.85,
            theta: 0.15,
        },
        slippage: SlippageSpec::empirical(0.9, 1.2, 1_500_000.0),
        failures: FailureProbs { fail_before: 0.02, fail_between: 0.01, reorg_or_mev: 0.0 },
        flash_enabled: false,
        risk_aversion_lambda: 0.00005,
        capital_usd: 10_000.0,
    }
}

/// Scenario A: an analytically derived breakeven edge evaluates to ~zero
/// EV per second at full size.
#[test]
fn scenario_a_breakeven_solver() {
    let size = 10_000.0f64;
    let slip_bps = 0.9 * (size / 1_500_000.0f64).powf(1.2);
    let slip_cost = slip_bps / 1e4 * size;

    let p_fill = 0.85 * (-0.15f64 * 0.5).exp();
    let p_success = p_fill * (1.0 - 0.02 - 0.01);

    // EV = pS·(E − decay − fees − slip − gas − adverse) + pFB·(−gas)
    //    + pFBW·(−0.7·slip − gas − adverse) = 0, solved for E.
    let fixed_losses = 0.02 * 0.2 + 0.01 * (0.7 * slip_cost + 0.2 + 0.5);
    let success_target = fixed_losses / p_success;
    let edge_star = success_target + 0.75 + 8.0 + slip_cost + 0.2 + 0.5;

    let result = evaluate(&scenario_inputs(edge_star, 0.5));
    assert!(
        result.ev_per_sec.abs() < 0.05,
        "ev_per_sec = {} at edge {edge_star}",
        result.ev_per_sec
    );
    assert!((result.size_opt_usd - size).abs() < 1e-6);
}

/// Scenario B: higher latency can only hurt.
#[test]
fn scenario_b_latency_degradation() {
    let fast = evaluate(&scenario_inputs(25.0, 0.2));
    let slow = evaluate(&scenario_inputs(25.0, 2.0));

    assert!(fast.p_success > slow.p_success);
    assert!(fast.net_usd_est > slow.net_usd_est);
}

fn univ3_spec(fee_tier_bps: u32) -> SlippageSpec {
    SlippageSpec::UniV3 {
        sqrt_price_q96: Q96,
        liquidity: 1_000_000u128 << 96,
        fee_tier_bps,
        tick_spacing: 60,
        ticks: vec![],
        usd_per_token_in: 1.0,
        zero_for_one: true,
    }
}

/// Scenario C: slippage through the UniV3 simulator is positive and
/// strictly increasing in size.
#[test]
fn scenario_c_univ3_slippage_ordering() {
    let spec = univ3_spec(30);
    let mut prev = 0.0;
    for size in [10.0, 100.0, 1_000.0] {
        let slip = effective_slip_bps(&spec, size);
        assert!(slip > 0.0, "slip at {size} should be positive");
        assert!(slip > prev, "slip at {size}: {slip} <= {prev}");
        prev = slip;
    }
}

/// Scenario D: a fatter fee tier realizes more slippage.
#[test]
fn scenario_d_fee_tier_monotonicity() {
    let lo = effective_slip_bps(&univ3_spec(5), 100.0);
    let hi = effective_slip_bps(&univ3_spec(100), 100.0);
    assert!(hi > lo, "fee=100 slip {hi} must exceed fee=5 slip {lo}");
}

/// Scenario E: two fresh pools 25 bps apart yield exactly one cross-venue
/// opportunity, ordered cheap → rich, profitable after gas.
#[test]
fn scenario_e_cross_venue_detection() {
    const NOW: i64 = 1_000_000;
    let token = |n: u8| Address::repeat_byte(n);

    let pool = |addr: u8, sqrt: U256, ts: i64| PoolState {
        address: token(addr),
        pair: TokenPair::new(token(1), token(2)),
        sqrt_price_q96: sqrt,
        liquidity: 500_000_000_000_000_000_000_000, // ≈ $1M at $1 tokens
        tick: 0,
        fee_tier_bps: 1,
        tick_spacing: 60,
        last_block: 1,
        last_updated_ms: ts,
    };

    let graph = PoolGraph::new();
    let cache = PriceCache::new();
    // Both updated within the last second.
    for p in [pool(0xaa, Q96, NOW - 800), pool(0xbb, sqrt_q96_at_tick(25), NOW - 200)] {
        graph.register_pool(p.clone());
        cache.update_from_pool(&p, 10.0, 5_000.0);
    }

    let detector = OpportunityDetector::new(
        DetectorConfig::default(),
        graph,
        cache,
        Arc::new(StaticPriceOracle::new(1.0)),
    );

    let opps = detector.on_swap(token(0xbb), NOW);
    assert_eq!(opps.len(), 1);

    let opp = &opps[0];
    assert_eq!(opp.kind, OpportunityKind::CrossVenue);
    // Pool aa prices token0 cheaper: buy there first.
    assert_eq!(opp.path[0].pool, token(0xaa));
    assert_eq!(opp.path[1].pool, token(0xbb));
    assert!(opp.profit_usd > 0.0, "net profit after gas: {}", opp.profit_usd);
}

/// Scenario F: the approval check passes generous coverage and rejects
/// short coverage with the specific reason code.
#[test]
fn scenario_f_gate_approval() {
    let thresholds = GateThresholds {
        min_backtest_hours: 24.0,
        min_p_success: 0.75,
        min_ev_adj_usd: 0.0,
        max_drawdown: f64::INFINITY,
    };

    let store = MemoryStrategyStore::new();
    let mut strategy = Strategy::new("candidate", OpportunityKind::CrossVenue);
    strategy.status = StrategyStatus::Backtesting;
    strategy.coverage = BacktestCoverage {
        coverage_hours: 30.0,
        p_success: 0.8,
        ev_adj_usd: 1.0,
        max_drawdown: 0.0,
    };
    store.upsert(strategy.clone());

    assert_eq!(
        store.promote("candidate", &thresholds).unwrap(),
        StrategyStatus::Approved
    );

    strategy.coverage.coverage_hours = 12.0;
    strategy.status = StrategyStatus::Backtesting;
    store.upsert(strategy);

    assert_eq!(
        store.promote("candidate", &thresholds).unwrap(),
        StrategyStatus::Rejected
    );
    assert_eq!(
        store.get("candidate").unwrap().rejection_reason.as_deref(),
        Some(gate::REASON_INSUFFICIENT_COVERAGE)
    );
}

/// Universal invariants: size bounds, probability bounds, non-negative
/// slippage across both models.
#[test]
fn universal_invariants_hold_across_a_grid() {
    for edge in [0.0, 5.0, 25.0, 120.0] {
        for latency in [0.0, 0.5, 3.0] {
            let result = evaluate(&scenario_inputs(edge, latency));
            assert!(result.size_opt_usd >= 0.0);
            assert!(result.size_opt_usd <= 10_000.0);
            assert!((0.0..=1.0).contains(&result.p_success));
            assert!(result.breakeven_bps >= 0.0);
            assert!(result.slip_bps_eff >= 0.0);
        }
    }

    let empirical = SlippageSpec::empirical(0.9, 1.2, 1_500_000.0);
    let univ3 = univ3_spec(30);
    for size in [0.0, 1.0, 100.0, 50_000.0] {
        assert!(effective_slip_bps(&empirical, size) >= 0.0);
        assert!(effective_slip_bps(&univ3, size) >= 0.0);
    }
}
