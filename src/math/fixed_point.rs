//! Q64.96 fixed-point arithmetic.
//!
//! All operations are on unsigned 256-bit integers with 512-bit
//! intermediates, rounding down unless stated otherwise. Deterministic and
//! bit-identical across platforms; nothing here panics.

use alloy::primitives::{U256, U512};
use alloy::primitives::ruint::UintTryFrom;
use once_cell::sync::Lazy;

/// 2^96, the Q64.96 scale factor.
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// Tick bounds of a UniV3-style pool.
pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// sqrt price at MIN_TICK.
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([4_295_128_739, 0, 0, 0]);

/// Floor of a·b/denom computed through a 512-bit intermediate, so the
/// product never overflows. A zero denominator returns `a` unchanged; the
/// caller treats that as a no-op swap. A quotient exceeding 256 bits
/// saturates to `U256::MAX`.
pub fn mul_div(a: U256, b: U256, denom: U256) -> U256 {
    if denom.is_zero() {
        return a;
    }
    let prod = U512::from(a) * U512::from(b);
    let q = prod / U512::from(denom);
    U256::uint_try_from(q).unwrap_or(U256::MAX)
}

/// Ceiling variant of [`mul_div`]. Same zero-denominator and saturation
/// behavior.
pub fn mul_div_rounding_up(a: U256, b: U256, denom: U256) -> U256 {
    if denom.is_zero() {
        return a;
    }
    let prod = U512::from(a) * U512::from(b);
    let d = U512::from(denom);
    let mut q = prod / d;
    if prod % d != U512::ZERO {
        q += U512::from(1u8);
    }
    U256::uint_try_from(q).unwrap_or(U256::MAX)
}

/// (a·b) >> 128, via a 512-bit intermediate.
fn mul_shift_128(a: U256, b: U256) -> U256 {
    let prod = (U512::from(a) * U512::from(b)) >> 128;
    U256::uint_try_from(prod).unwrap_or(U256::MAX)
}

/// Lossy conversion for display/scoring use only. The UniV3 swap path keeps
/// everything integer until the final slippage-to-bps step.
pub fn u256_to_f64(x: U256) -> f64 {
    let limbs = x.as_limbs();
    let mut acc = 0.0f64;
    for (i, limb) in limbs.iter().enumerate() {
        acc += (*limb as f64) * 2f64.powi(64 * i as i32);
    }
    acc
}

/// price = sqrtPrice² / 2^192, as a float. Token1 per token0, raw units.
pub fn price_from_sqrt_q96(sqrt_price_q96: U256) -> f64 {
    let s = u256_to_f64(sqrt_price_q96) / 2f64.powi(96);
    s * s
}

/// Q96 reciprocal: 2^192 / sqrtPrice, i.e. sqrt(1/P) in Q64.96.
/// Returns zero for a zero input.
pub fn reciprocal_sqrt_q96(sqrt_price_q96: U256) -> U256 {
    if sqrt_price_q96.is_zero() {
        return U256::ZERO;
    }
    mul_div(Q96, Q96, sqrt_price_q96)
}

/// Canonical Q128.128 multiplier ladder, parsed once.
static SQRT_RATIO_STEPS: Lazy<[(u32, U256); 19]> = Lazy::new(|| {
    [
        (0x2, u256_hex("fff97272373d413259a46990580e213a")),
        (0x4, u256_hex("fff2e50f5f656932ef12357cf3c7fdcc")),
        (0x8, u256_hex("ffe5caca7e10e4e61c3624eaa0941cd0")),
        (0x10, u256_hex("ffcb9843d60f6159c9db58835c926644")),
        (0x20, u256_hex("ff973b41fa98c081472e6896dfb254c0")),
        (0x40, u256_hex("ff2ea16466c96a3843ec78b326b52861")),
        (0x80, u256_hex("fe5dee046a99a2a811c461f1969c3053")),
        (0x100, u256_hex("fcbe86c7900a88aedcffc83b479aa3a4")),
        (0x200, u256_hex("f987a7253ac413176f2b074cf7815e54")),
        (0x400, u256_hex("f3392b0822b70005940c7a398e4b70f3")),
        (0x800, u256_hex("e7159475a2c29b7443b29c7fa6e889d9")),
        (0x1000, u256_hex("d097f3bdfd2022b8845ad8f792aa5825")),
        (0x2000, u256_hex("a9f746462d870fdf8a65dc1f90e061e5")),
        (0x4000, u256_hex("70d869a156d2a1b890bb3df62baf32f7")),
        (0x8000, u256_hex("31be135f97d08fd981231505542fcfa6")),
        (0x10000, u256_hex("9aa508b5b7a84e1c677de54f3e99bc9")),
        (0x20000, u256_hex("5d6af8dedb81196699c329225ee604")),
        (0x40000, u256_hex("2216e584f5fa1ea926041bedfe98")),
        (0x80000, u256_hex("48a170391f7dc42444e8fa2")),
    ]
});

static ODD_TICK_RATIO: Lazy<U256> = Lazy::new(|| u256_hex("fffcb933bd6fad37aa2d162d1a594001"));
static ONE_Q128: Lazy<U256> = Lazy::new(|| u256_hex("100000000000000000000000000000000"));

/// sqrt(1.0001^tick) in Q64.96, computed with the canonical bit-ladder of
/// Q128.128 multipliers, then narrowed to Q64.96 rounding up. Out-of-range
/// ticks are clamped to [MIN_TICK, MAX_TICK].
pub fn sqrt_q96_at_tick(tick: i32) -> U256 {
    let tick = tick.clamp(MIN_TICK, MAX_TICK);
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        *ODD_TICK_RATIO
    } else {
        *ONE_Q128
    };

    for (mask, mult) in SQRT_RATIO_STEPS.iter() {
        if abs_tick & mask != 0 {
            ratio = mul_shift_128(ratio, *mult);
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 → Q64.96, rounding up.
    let down = ratio >> 32;
    if (ratio & U256::from(0xffff_ffffu64)) == U256::ZERO {
        down
    } else {
        down + U256::from(1u8)
    }
}

/// Largest tick whose sqrt ratio does not exceed `sqrt_price_q96`.
/// Binary search against [`sqrt_q96_at_tick`]; exact at boundaries.
pub fn tick_at_sqrt_q96(sqrt_price_q96: U256) -> i32 {
    if sqrt_price_q96 <= MIN_SQRT_RATIO {
        return MIN_TICK;
    }
    let mut lo = MIN_TICK;
    let mut hi = MAX_TICK;
    while lo < hi {
        // Bias up so the loop converges onto the floor tick.
        let mid = lo + (hi - lo + 1) / 2;
        if sqrt_q96_at_tick(mid) <= sqrt_price_q96 {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

fn u256_hex(hex: &str) -> U256 {
    U256::from_str_radix(hex, 16).unwrap_or(U256::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_basic() {
        let a = U256::from(1_000_000u64);
        let b = U256::from(3u64);
        assert_eq!(mul_div(a, b, U256::from(2u64)), U256::from(1_500_000u64));
    }

    #[test]
    fn mul_div_zero_denominator_returns_operand() {
        let a = U256::from(12345u64);
        assert_eq!(mul_div(a, U256::from(99u64), U256::ZERO), a);
        assert_eq!(mul_div_rounding_up(a, U256::from(99u64), U256::ZERO), a);
    }

    #[test]
    fn mul_div_no_intermediate_overflow() {
        // a·b overflows 256 bits but the quotient fits.
        let a = U256::MAX / U256::from(2u64);
        let b = U256::from(4u64);
        let q = mul_div(a, b, U256::from(4u64));
        assert_eq!(q, a);
    }

    #[test]
    fn mul_div_rounding_up_rounds() {
        assert_eq!(
            mul_div_rounding_up(U256::from(10u64), U256::from(1u64), U256::from(3u64)),
            U256::from(4u64)
        );
        assert_eq!(
            mul_div(U256::from(10u64), U256::from(1u64), U256::from(3u64)),
            U256::from(3u64)
        );
    }

    #[test]
    fn price_at_unit_sqrt_is_one() {
        let price = price_from_sqrt_q96(Q96);
        assert!((price - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sqrt_ratio_at_tick_zero_is_q96() {
        assert_eq!(sqrt_q96_at_tick(0), Q96);
    }

    #[test]
    fn sqrt_ratio_matches_min_bound() {
        assert_eq!(sqrt_q96_at_tick(MIN_TICK), MIN_SQRT_RATIO);
    }

    #[test]
    fn sqrt_ratio_is_monotone_in_tick() {
        let ticks = [-887_272, -100_000, -60, -1, 0, 1, 60, 100_000, 887_272];
        for w in ticks.windows(2) {
            assert!(sqrt_q96_at_tick(w[0]) < sqrt_q96_at_tick(w[1]));
        }
    }

    #[test]
    fn tick_round_trips_through_sqrt_ratio() {
        for tick in [-887_272, -120_000, -60, 0, 1, 10, 60, 120_000, 887_272] {
            let sqrt = sqrt_q96_at_tick(tick);
            assert_eq!(tick_at_sqrt_q96(sqrt), tick, "tick {tick}");
        }
    }

    #[test]
    fn tick_one_approximates_a_bp() {
        // sqrt(1.0001) ≈ 1.00005: one tick is one basis point of price.
        let p = price_from_sqrt_q96(sqrt_q96_at_tick(1));
        assert!((p - 1.0001).abs() < 1e-7);
    }

    #[test]
    fn reciprocal_round_trip() {
        let sqrt = sqrt_q96_at_tick(1000);
        let inv = reciprocal_sqrt_q96(sqrt);
        let product = price_from_sqrt_q96(sqrt) * price_from_sqrt_q96(inv);
        assert!((product - 1.0).abs() < 1e-9);
    }
}
