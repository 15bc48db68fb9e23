//! TON Oracle Library
//!
//! Periodic price-oracle updater: reads the on-chain price state, aggregates
//! TON/USDT quotes from public exchanges and submits the update transaction

pub mod chain;
pub mod config;
pub mod error;
pub mod oracle;
pub mod schedule;
pub mod types;
pub mod updater;
pub mod wallet;
