//! Binance spot REST client
//!
//! Uses the rolling average price endpoint (`/api/v3/avgPrice`).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{get_body, parse_price, QuoteError, QuoteSource};
use crate::types::{PriceQuote, QuoteSourceKind};

pub const BINANCE_AVG_PRICE_URL: &str = "https://api.binance.com/api/v3/avgPrice?symbol=TONUSDT";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvgPriceResponse {
    #[serde(default)]
    mins: Option<u32>,
    price: Option<String>,
    #[serde(default)]
    close_time: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    url: String,
}

impl BinanceClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn parse_response(body: &str, fetched_at: DateTime<Utc>) -> Result<PriceQuote, QuoteError> {
        let resp: AvgPriceResponse =
            serde_json::from_str(body).map_err(|e| QuoteError::Parse(e.to_string()))?;
        let raw = resp
            .price
            .ok_or_else(|| QuoteError::Parse("missing price field".to_string()))?;
        let value = parse_price(&raw)?;

        let observed_at = resp
            .close_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(fetched_at);

        tracing::debug!(
            source = %"Binance",
            price = %value,
            window_mins = resp.mins.unwrap_or_default(),
            "Quote parsed"
        );

        Ok(PriceQuote {
            source: QuoteSourceKind::Binance,
            value,
            observed_at,
        })
    }
}

#[async_trait]
impl QuoteSource for BinanceClient {
    fn kind(&self) -> QuoteSourceKind {
        QuoteSourceKind::Binance
    }

    async fn fetch_quote(&self) -> Result<PriceQuote, QuoteError> {
        let body = get_body(&self.client, &self.url).await?;
        Self::parse_response(&body, Utc::now())
    }
}
