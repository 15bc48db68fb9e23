//! Core types used throughout the updater
//!
//! Per-cycle data: the on-chain snapshot, external quotes, the aggregate and
//! the update message pushed to the oracle contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::Address;

/// External price feed identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteSourceKind {
    Binance,
    Okx,
}

impl fmt::Display for QuoteSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteSourceKind::Binance => write!(f, "Binance"),
            QuoteSourceKind::Okx => write!(f, "OKX"),
        }
    }
}

/// One external source's price at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub source: QuoteSourceKind,
    /// Quoted price in USDT, always > 0
    pub value: Decimal,
    /// Feed-reported time of the quote
    pub observed_at: DateTime<Utc>,
}

/// Single price combined from all usable quotes of a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPrice {
    /// Fixed-point value in contract units (mean × scale factor)
    pub value: u32,
    /// Number of quotes actually used
    pub source_count: usize,
    /// Unscaled arithmetic mean
    pub mean: Decimal,
    /// Relative spread between highest and lowest used quote
    pub spread: Decimal,
    pub sources: Vec<QuoteSourceKind>,
}

/// Snapshot of the oracle contract returned by its price get-method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainPriceState {
    pub current_price: i128,
    pub daily_initial_price: i128,
    pub last_updated_at: DateTime<Utc>,
    pub price_admin: Address,
    pub super_admin: Address,
}

/// Body of the price update message sent to the oracle contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateMessage {
    pub op_code: u32,
    /// Correlates this submission with its on-chain effect
    pub query_id: u64,
    pub new_price: u32,
    /// Unix seconds
    pub submitted_at: u32,
    pub flags: u8,
}
