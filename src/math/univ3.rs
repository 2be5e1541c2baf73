//! Tick-walking UniV3 swap simulation.
//!
//! Given a pool snapshot and an exact input, walks initialized ticks in the
//! swap direction and returns the output amount, the final sqrt price, and
//! the realized slippage versus the starting mid price. All price math is
//! integer Q64.96; the only float conversion is the final slippage-to-bps
//! step, done on ≥1e9-scaled integer ratios.
//!
//! Never fails: internal inconsistencies (zero liquidity, zero price)
//! produce a no-op outcome with slip = 0.

use alloy::primitives::{U256, U512};
use alloy::primitives::ruint::UintTryFrom;

use super::fixed_point::{self, Q96};
use crate::types::TickRecord;

/// Safety cap on tick crossings per swap. If exhausted, the remainder is
/// executed with the no-cross formula.
const MAX_TICK_CROSSINGS: usize = 160;

/// Integer scale for the slippage ratio before the float conversion.
const SLIP_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Inputs for one exact-input swap simulation.
#[derive(Debug, Clone)]
pub struct SwapParams<'a> {
    pub start_sqrt_price_q96: U256,
    /// In-range liquidity at the starting price.
    pub liquidity: u128,
    pub fee_bps: u32,
    pub amount_in: U256,
    /// true = token0 in, token1 out (price decreases).
    pub zero_for_one: bool,
    /// Initialized ticks sorted ascending by index. Empty = no-cross swap.
    pub ticks: &'a [TickRecord],
}

/// Result of one simulated swap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapOutcome {
    pub amount_out: U256,
    pub new_sqrt_price_q96: U256,
    /// Realized-vs-mid execution cost in basis points, ≥ 0.
    pub slip_bps: f64,
}

impl SwapOutcome {
    fn noop(sqrt_price: U256) -> Self {
        Self {
            amount_out: U256::ZERO,
            new_sqrt_price_q96: sqrt_price,
            slip_bps: 0.0,
        }
    }
}

/// Simulate an exact-input swap, crossing initialized ticks as needed.
pub fn simulate_swap(params: &SwapParams) -> SwapOutcome {
    let p0 = params.start_sqrt_price_q96;
    if params.amount_in.is_zero()
        || p0.is_zero()
        || params.liquidity == 0
        || params.fee_bps >= 10_000
    {
        return SwapOutcome::noop(p0);
    }

    // Fee is taken on input once; the walk runs in after-fee units.
    let after_fee = fixed_point::mul_div(
        params.amount_in,
        U256::from(10_000 - params.fee_bps),
        U256::from(10_000u32),
    );
    if after_fee.is_zero() {
        return SwapOutcome::noop(p0);
    }

    let mut sqrt_p = p0;
    let mut liquidity = params.liquidity;
    let mut remaining = after_fee;
    let mut amount_out = U256::ZERO;
    let mut crossings = 0usize;

    while !remaining.is_zero() && liquidity > 0 {
        let boundary = next_boundary(params.ticks, sqrt_p, params.zero_for_one);

        let (tick_idx, b_sqrt) = match boundary {
            Some(b) if crossings < MAX_TICK_CROSSINGS => b,
            // No initialized tick ahead, or crossing cap hit: finish no-cross.
            _ => {
                let (out, new_sqrt) =
                    swap_within(sqrt_p, liquidity, remaining, params.zero_for_one);
                amount_out += out;
                sqrt_p = new_sqrt;
                remaining = U256::ZERO;
                break;
            }
        };

        let max_in = input_to_reach(sqrt_p, b_sqrt, liquidity, params.zero_for_one);
        if remaining <= max_in {
            let (out, new_sqrt) = swap_within(sqrt_p, liquidity, remaining, params.zero_for_one);
            amount_out += out;
            sqrt_p = new_sqrt;
            remaining = U256::ZERO;
        } else {
            amount_out += output_for_segment(sqrt_p, b_sqrt, liquidity, params.zero_for_one);
            remaining -= max_in;
            sqrt_p = b_sqrt;
            // Crossing down consumes the tick's net liquidity; crossing up adds it.
            let net = params.ticks[tick_idx].liquidity_net;
            let signed = if params.zero_for_one { -net } else { net };
            liquidity = apply_liquidity_net(liquidity, signed);
            crossings += 1;
        }
    }

    SwapOutcome {
        amount_out,
        new_sqrt_price_q96: sqrt_p,
        slip_bps: slip_bps(p0, params.amount_in, amount_out, params.zero_for_one),
    }
}

/// Swap entirely within a constant-liquidity segment.
/// Returns (amount_out, new_sqrt_price). `amount_in_after_fee` > 0, liquidity > 0.
fn swap_within(
    sqrt_p: U256,
    liquidity: u128,
    amount_in_after_fee: U256,
    zero_for_one: bool,
) -> (U256, U256) {
    let liq = U256::from(liquidity);
    let lq: U256 = liq << 96;

    if zero_for_one {
        // newSqrt = L·P·Q96 / (L·Q96 + x·P)
        let num = U512::from(lq) * U512::from(sqrt_p);
        let denom = U512::from(lq) + U512::from(amount_in_after_fee) * U512::from(sqrt_p);
        if denom.is_zero() {
            return (U256::ZERO, sqrt_p);
        }
        let new_sqrt = U256::uint_try_from(num / denom).unwrap_or(U256::MAX);
        let out = fixed_point::mul_div(liq, sqrt_p - new_sqrt, Q96);
        (out, new_sqrt)
    } else {
        // newSqrt = P + y·Q96/L
        let delta = fixed_point::mul_div(amount_in_after_fee, Q96, liq);
        let new_sqrt = sqrt_p.saturating_add(delta);
        // outX = L·Q96·(newSqrt − P) / (P·newSqrt)
        let t = fixed_point::mul_div(lq, new_sqrt - sqrt_p, sqrt_p);
        let out = if new_sqrt.is_zero() { U256::ZERO } else { t / new_sqrt };
        (out, new_sqrt)
    }
}

/// After-fee input required to move the price from `sqrt_p` to the boundary.
/// Rounded up so a remaining amount equal to it never overshoots the tick.
fn input_to_reach(sqrt_p: U256, boundary: U256, liquidity: u128, zero_for_one: bool) -> U256 {
    let liq = U256::from(liquidity);
    if zero_for_one {
        if boundary >= sqrt_p {
            return U256::ZERO;
        }
        // x = L·Q96·(P − b) / (P·b)
        let lq: U256 = liq << 96;
        let t = fixed_point::mul_div_rounding_up(lq, sqrt_p - boundary, sqrt_p);
        if boundary.is_zero() {
            return U256::MAX;
        }
        fixed_point::mul_div_rounding_up(t, U256::from(1u8), boundary)
    } else {
        if boundary <= sqrt_p {
            return U256::ZERO;
        }
        // y = L·(b − P) / Q96
        fixed_point::mul_div_rounding_up(liq, boundary - sqrt_p, Q96)
    }
}

/// Output produced by moving the price all the way to the boundary.
fn output_for_segment(sqrt_p: U256, boundary: U256, liquidity: u128, zero_for_one: bool) -> U256 {
    let liq = U256::from(liquidity);
    if zero_for_one {
        // outY = L·(P − b)/Q96
        fixed_point::mul_div(liq, sqrt_p.saturating_sub(boundary), Q96)
    } else {
        // outX = L·Q96·(b − P)/(P·b)
        let lq: U256 = liq << 96;
        let t = fixed_point::mul_div(lq, boundary.saturating_sub(sqrt_p), sqrt_p);
        if boundary.is_zero() {
            U256::ZERO
        } else {
            t / boundary
        }
    }
}

/// Next initialized tick strictly ahead of the current price in the swap
/// direction. Returns (index into `ticks`, boundary sqrt price).
fn next_boundary(ticks: &[TickRecord], sqrt_p: U256, zero_for_one: bool) -> Option<(usize, U256)> {
    if zero_for_one {
        // Closest boundary strictly below the price: scan high → low.
        for (i, tick) in ticks.iter().enumerate().rev() {
            let b = tick.boundary_sqrt_q96();
            if !b.is_zero() && b < sqrt_p {
                return Some((i, b));
            }
        }
    } else {
        for (i, tick) in ticks.iter().enumerate() {
            let b = tick.boundary_sqrt_q96();
            if b > sqrt_p {
                return Some((i, b));
            }
        }
    }
    None
}

/// Apply a signed liquidity delta, clamping at zero. A clamp means the tick
/// data disagreed with in-range liquidity; the walk then terminates.
fn apply_liquidity_net(liquidity: u128, net: i128) -> u128 {
    if net >= 0 {
        liquidity.saturating_add(net as u128)
    } else {
        liquidity.saturating_sub(net.unsigned_abs())
    }
}

/// slipBps = max(0, (mid − realized)/mid) · 1e4, where mid is the starting
/// mid price oriented for the swap direction and realized = out/in. Both
/// ratios are built as SLIP_SCALE-scaled integers before the one float
/// conversion.
fn slip_bps(start_sqrt: U256, amount_in: U256, amount_out: U256, zero_for_one: bool) -> f64 {
    if amount_in.is_zero() || amount_out.is_zero() {
        return 0.0;
    }
    let realized = fixed_point::mul_div(amount_out, SLIP_SCALE, amount_in);

    // price0to1 scaled by Q96: t = P²/Q96
    let t = fixed_point::mul_div(start_sqrt, start_sqrt, Q96);
    if t.is_zero() {
        return 0.0;
    }
    let mid = if zero_for_one {
        fixed_point::mul_div(t, SLIP_SCALE, Q96)
    } else {
        fixed_point::mul_div(Q96, SLIP_SCALE, t)
    };
    if mid.is_zero() {
        return 0.0;
    }

    let mid_f = fixed_point::u256_to_f64(mid);
    let realized_f = fixed_point::u256_to_f64(realized);
    (((mid_f - realized_f) / mid_f) * 10_000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_pool_liquidity() -> u128 {
        // 10^6 * 2^96, deep liquidity around price 1.0
        1_000_000u128 << 96
    }

    fn params(amount_in: U256, fee_bps: u32, ticks: &[TickRecord]) -> SwapParams<'_> {
        SwapParams {
            start_sqrt_price_q96: Q96,
            liquidity: unit_pool_liquidity(),
            fee_bps,
            amount_in,
            zero_for_one: true,
            ticks,
        }
    }

    fn e18(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    #[test]
    fn zero_liquidity_is_noop() {
        let p = SwapParams {
            start_sqrt_price_q96: Q96,
            liquidity: 0,
            fee_bps: 30,
            amount_in: e18(10),
            zero_for_one: true,
            ticks: &[],
        };
        let out = simulate_swap(&p);
        assert_eq!(out.amount_out, U256::ZERO);
        assert_eq!(out.new_sqrt_price_q96, Q96);
        assert_eq!(out.slip_bps, 0.0);
    }

    #[test]
    fn slippage_increases_with_size() {
        let mut prev = 0.0;
        for n in [10u64, 100, 1000] {
            let out = simulate_swap(&params(e18(n), 30, &[]));
            assert!(out.slip_bps > prev, "amount {n}e18: {} <= {prev}", out.slip_bps);
            assert!(out.slip_bps > 0.0);
            prev = out.slip_bps;
        }
    }

    #[test]
    fn slippage_increases_with_fee() {
        let lo = simulate_swap(&params(e18(100), 5, &[]));
        let hi = simulate_swap(&params(e18(100), 100, &[]));
        assert!(hi.slip_bps > lo.slip_bps);
    }

    #[test]
    fn output_never_beats_mid_price() {
        // At mid price 1.0, amountOut ≤ amountIn.
        for n in [1u64, 50, 500] {
            let out = simulate_swap(&params(e18(n), 30, &[]));
            assert!(out.amount_out <= e18(n));
        }
    }

    #[test]
    fn price_moves_down_for_zero_for_one() {
        let out = simulate_swap(&params(e18(100), 30, &[]));
        assert!(out.new_sqrt_price_q96 < Q96);
    }

    #[test]
    fn price_moves_up_for_one_for_zero() {
        let mut p = params(e18(100), 30, &[]);
        p.zero_for_one = false;
        let out = simulate_swap(&p);
        assert!(out.new_sqrt_price_q96 > Q96);
        assert!(out.slip_bps > 0.0);
    }

    #[test]
    fn crossing_a_draining_tick_raises_slippage() {
        // A tick just below the current price that removes 90% of liquidity
        // when crossed downward.
        let liq = unit_pool_liquidity();
        let tick = TickRecord {
            index: -10,
            liquidity_net: (liq as i128 / 10) * 9,
            sqrt_price_q96: None,
        };
        let with_tick = simulate_swap(&params(e18(100_000), 30, std::slice::from_ref(&tick)));
        let without = simulate_swap(&params(e18(100_000), 30, &[]));
        assert!(with_tick.amount_out < without.amount_out);
        assert!(with_tick.slip_bps > without.slip_bps);
        assert!(with_tick.new_sqrt_price_q96 < without.new_sqrt_price_q96);
    }

    #[test]
    fn small_swap_does_not_reach_far_tick() {
        let tick = TickRecord {
            index: -5000,
            liquidity_net: 1,
            sqrt_price_q96: None,
        };
        let with_tick = simulate_swap(&params(e18(10), 30, std::slice::from_ref(&tick)));
        let without = simulate_swap(&params(e18(10), 30, &[]));
        assert_eq!(with_tick.amount_out, without.amount_out);
        assert_eq!(with_tick.new_sqrt_price_q96, without.new_sqrt_price_q96);
    }
}
