//! Price source implementations (Binance, OKX)

mod binance;
mod okx;

pub use binance::{BinanceClient, BINANCE_AVG_PRICE_URL};
pub use okx::{OkxClient, OKX_MARK_PRICE_URL};

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::types::{PriceQuote, QuoteSourceKind};

/// Why a single source produced no quote
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("unparseable response: {0}")]
    Parse(String),

    #[error("non-positive price {0}")]
    NonPositive(Decimal),

    #[error("no answer within {0}ms")]
    Timeout(u64),
}

/// Trait for one-shot price source clients
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn kind(&self) -> QuoteSourceKind;

    /// Fetch the current quote for the configured pair
    async fn fetch_quote(&self) -> Result<PriceQuote, QuoteError>;
}

/// GET `url` and return the body of a 2xx response
async fn get_body(client: &Client, url: &str) -> Result<String, QuoteError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| QuoteError::Unreachable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(QuoteError::Status(response.status().as_u16()));
    }

    response
        .text()
        .await
        .map_err(|e| QuoteError::Unreachable(e.to_string()))
}

/// Parse a decimal price string; zero and negative prices are rejected
fn parse_price(raw: &str) -> Result<Decimal, QuoteError> {
    let raw = raw.trim();
    let value = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| QuoteError::Parse(format!("price '{}' is not a number", raw)))?;
    if value <= Decimal::ZERO {
        return Err(QuoteError::NonPositive(value));
    }
    Ok(value)
}
