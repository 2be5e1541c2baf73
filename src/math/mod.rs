//! Exact pool math: Q64.96 fixed-point arithmetic and tick-walking
//! swap simulation.

pub mod fixed_point;
pub mod univ3;

pub use fixed_point::{mul_div, price_from_sqrt_q96, Q96};
pub use univ3::{simulate_swap, SwapOutcome, SwapParams};
