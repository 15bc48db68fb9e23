//! OKX public REST client
//!
//! Reads the margin mark price (`/api/v5/public/mark-price`).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{get_body, parse_price, QuoteError, QuoteSource};
use crate::types::{PriceQuote, QuoteSourceKind};

pub const OKX_MARK_PRICE_URL: &str =
    "https://www.okx.com/api/v5/public/mark-price?instType=MARGIN&instId=TON-USDT";

#[derive(Debug, Deserialize)]
struct MarkPriceResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<MarkPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkPrice {
    inst_id: Option<String>,
    mark_px: Option<String>,
    ts: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OkxClient {
    client: Client,
    url: String,
}

impl OkxClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn parse_response(body: &str, fetched_at: DateTime<Utc>) -> Result<PriceQuote, QuoteError> {
        let resp: MarkPriceResponse =
            serde_json::from_str(body).map_err(|e| QuoteError::Parse(e.to_string()))?;

        if resp.code != "0" {
            return Err(QuoteError::Parse(format!(
                "OKX error code {}: {}",
                resp.code, resp.msg
            )));
        }

        let entry = resp
            .data
            .into_iter()
            .next()
            .ok_or_else(|| QuoteError::Parse("empty data array".to_string()))?;
        let raw = entry
            .mark_px
            .ok_or_else(|| QuoteError::Parse("missing markPx field".to_string()))?;
        let value = parse_price(&raw)?;

        let observed_at = entry
            .ts
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(fetched_at);

        tracing::debug!(
            source = %"OKX",
            inst_id = %entry.inst_id.as_deref().unwrap_or("?"),
            price = %value,
            "Quote parsed"
        );

        Ok(PriceQuote {
            source: QuoteSourceKind::Okx,
            value,
            observed_at,
        })
    }
}

#[async_trait]
impl QuoteSource for OkxClient {
    fn kind(&self) -> QuoteSourceKind {
        QuoteSourceKind::Okx
    }

    async fn fetch_quote(&self) -> Result<PriceQuote, QuoteError> {
        let body = get_body(&self.client, &self.url).await?;
        Self::parse_response(&body, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_mark_price_payload() {
        let body = r#"{"code":"0","msg":"","data":[{"instId":"TON-USDT","instType":"MARGIN","markPx":"7.3","ts":"1700000000123"}]}"#;
        let quote = OkxClient::parse_response(body, Utc::now()).unwrap();
        assert_eq!(quote.source, QuoteSourceKind::Okx);
        assert_eq!(quote.value, dec!(7.30));
        assert_eq!(quote.observed_at.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn empty_data_is_soft_failure() {
        let body = r#"{"code":"0","msg":"","data":[]}"#;
        assert_eq!(
            OkxClient::parse_response(body, Utc::now()),
            Err(QuoteError::Parse("empty data array".to_string()))
        );
    }

    #[test]
    fn non_zero_code_is_rejected() {
        let body = r#"{"code":"51001","msg":"Instrument ID does not exist","data":[]}"#;
        assert!(matches!(
            OkxClient::parse_response(body, Utc::now()),
            Err(QuoteError::Parse(_))
        ));
    }

    #[test]
    fn unparseable_mark_price_is_rejected() {
        let body = r#"{"code":"0","msg":"","data":[{"markPx":"","ts":"1"}]}"#;
        assert!(OkxClient::parse_response(body, Utc::now()).is_err());
    }
}
