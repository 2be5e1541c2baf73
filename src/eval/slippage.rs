//! Slippage model dispatch.
//!
//! USD↔token unit reconciliation lives here: callers pass USD sizes, the
//! UniV3 branch converts into raw token-in units (18 decimals assumed) and
//! runs the tick-walking simulator. Missing or inconsistent UniV3 state
//! degrades to the empirical curve with conservative parameters.

use alloy::primitives::U256;

use crate::math::univ3::{simulate_swap, SwapParams};
use crate::types::SlippageSpec;

/// Token decimals assumed when converting USD size to raw token units.
pub const DEFAULT_TOKEN_DECIMALS: i32 = 18;

/// Conservative empirical parameters used when UniV3 state is unusable.
const DEGRADED_K: f64 = 2.0;
const DEGRADED_ALPHA: f64 = 1.5;
const DEGRADED_LIQUIDITY_REF_USD: f64 = 100_000.0;

/// Effective slippage in bps for a USD-denominated trade size. Always ≥ 0.
pub fn effective_slip_bps(spec: &SlippageSpec, size_usd: f64) -> f64 {
    if size_usd <= 0.0 || !size_usd.is_finite() {
        return 0.0;
    }
    match spec {
        SlippageSpec::Empirical { k, alpha, liquidity_ref_usd } => {
            empirical_slip_bps(*k, *alpha, *liquidity_ref_usd, size_usd)
        }
        SlippageSpec::UniV3 {
            sqrt_price_q96,
            liquidity,
            fee_tier_bps,
            ticks,
            usd_per_token_in,
            zero_for_one,
            ..
        } => {
            if sqrt_price_q96.is_zero() || *liquidity == 0 || *usd_per_token_in <= 0.0 {
                return empirical_slip_bps(
                    DEGRADED_K,
                    DEGRADED_ALPHA,
                    DEGRADED_LIQUIDITY_REF_USD,
                    size_usd,
                );
            }
            let tokens_in = size_usd / usd_per_token_in;
            let raw_in = tokens_to_raw(tokens_in);
            if raw_in.is_zero() {
                return 0.0;
            }
            let outcome = simulate_swap(&SwapParams {
                start_sqrt_price_q96: *sqrt_price_q96,
                liquidity: *liquidity,
                fee_bps: *fee_tier_bps,
                amount_in: raw_in,
                zero_for_one: *zero_for_one,
                ticks,
            });
            outcome.slip_bps
        }
    }
}

/// slipBps = k · (sizeUsd / liquidityRefUsd)^max(alpha, 1).
fn empirical_slip_bps(k: f64, alpha: f64, liquidity_ref_usd: f64, size_usd: f64) -> f64 {
    if k <= 0.0 || liquidity_ref_usd <= 0.0 {
        return 0.0;
    }
    let exponent = alpha.max(1.0);
    (k * (size_usd / liquidity_ref_usd).powf(exponent)).max(0.0)
}

/// Whole tokens → raw units at [`DEFAULT_TOKEN_DECIMALS`]. Saturating cast;
/// non-finite inputs map to zero.
fn tokens_to_raw(tokens: f64) -> U256 {
    if !tokens.is_finite() || tokens <= 0.0 {
        return U256::ZERO;
    }
    let raw = tokens * 10f64.powi(DEFAULT_TOKEN_DECIMALS);
    U256::from(raw as u128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::fixed_point::Q96;

    #[test]
    fn empirical_is_monotone_in_size() {
        let spec = SlippageSpec::empirical(0.9, 1.2, 1_500_000.0);
        let mut prev = -1.0;
        for size in [0.0, 1_000.0, 10_000.0, 100_000.0] {
            let slip = effective_slip_bps(&spec, size);
            assert!(slip >= prev);
            assert!(slip >= 0.0);
            prev = slip;
        }
    }

    #[test]
    fn empirical_floors_alpha_at_one() {
        // alpha below 1 must behave like alpha = 1 (linear).
        let sub_linear = SlippageSpec::empirical(1.0, 0.5, 100_000.0);
        let linear = SlippageSpec::empirical(1.0, 1.0, 100_000.0);
        assert_eq!(
            effective_slip_bps(&sub_linear, 50_000.0),
            effective_slip_bps(&linear, 50_000.0)
        );
    }

    #[test]
    fn univ3_with_state_returns_positive_slip() {
        let spec = SlippageSpec::UniV3 {
            sqrt_price_q96: Q96,
            liquidity: 1_000_000u128 << 96,
            fee_tier_bps: 30,
            tick_spacing: 60,
            ticks: vec![],
            usd_per_token_in: 1.0,
            zero_for_one: true,
        };
        let slip = effective_slip_bps(&spec, 10_000.0);
        assert!(slip > 0.0);
        assert!(effective_slip_bps(&spec, 100_000.0) > slip);
    }

    #[test]
    fn univ3_missing_state_degrades_to_empirical() {
        let spec = SlippageSpec::UniV3 {
            sqrt_price_q96: U256::ZERO,
            liquidity: 0,
            fee_tier_bps: 30,
            tick_spacing: 60,
            ticks: vec![],
            usd_per_token_in: 1.0,
            zero_for_one: true,
        };
        let slip = effective_slip_bps(&spec, 50_000.0);
        let expected = effective_slip_bps(
            &SlippageSpec::empirical(DEGRADED_K, DEGRADED_ALPHA, DEGRADED_LIQUIDITY_REF_USD),
            50_000.0,
        );
        assert_eq!(slip, expected);
        assert!(slip > 0.0);
    }

    #[test]
    fn zero_size_has_zero_slip() {
        let spec = SlippageSpec::empirical(0.9, 1.2, 1_500_000.0);
        assert_eq!(effective_slip_bps(&spec, 0.0), 0.0);
        assert_eq!(effective_slip_bps(&spec, -5.0), 0.0);
    }
}
