//! Pool state tracking: the pool/pair graph and the derived price cache.

pub mod graph;
pub mod price_cache;

pub use graph::{PoolGraph, SwapApply};
pub use price_cache::PriceCache;
