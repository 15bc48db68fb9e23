//! Oracle module - Multi-source price aggregation
//!
//! Fetches one quote per external feed (Binance, OKX) and combines them into
//! the fixed-point price written to the oracle contract.

mod aggregator;
mod collector;
pub mod sources;

pub use aggregator::PriceAggregator;
pub use collector::{QuoteCollection, QuoteCollector};
