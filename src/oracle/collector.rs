//! Quote collector - one concurrent fetch per configured source

use futures_util::future::join_all;
use std::time::Duration;

use crate::error::CycleError;
use crate::oracle::sources::{QuoteError, QuoteSource};
use crate::types::{PriceQuote, QuoteSourceKind};

/// Result of one fan-out/fan-in round
#[derive(Debug, Clone, Default)]
pub struct QuoteCollection {
    /// Usable quotes in source configuration order
    pub quotes: Vec<PriceQuote>,
    /// Soft failures (`QuoteFetchFailed`), one per failed source
    pub failures: Vec<CycleError>,
}

pub struct QuoteCollector {
    sources: Vec<Box<dyn QuoteSource>>,
    per_source_timeout: Duration,
}

impl QuoteCollector {
    pub fn new(sources: Vec<Box<dyn QuoteSource>>, per_source_timeout: Duration) -> Self {
        Self {
            sources,
            per_source_timeout,
        }
    }

    pub fn source_kinds(&self) -> Vec<QuoteSourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// Query every source concurrently; waits until each answered or timed out
    pub async fn collect(&self) -> QuoteCollection {
        let timeout = self.per_source_timeout;
        let fetches = self.sources.iter().map(|source| async move {
            let result = match tokio::time::timeout(timeout, source.fetch_quote()).await {
                Ok(result) => result,
                Err(_) => Err(QuoteError::Timeout(timeout.as_millis() as u64)),
            };
            (source.kind(), result)
        });

        let mut collection = QuoteCollection::default();
        for (kind, result) in join_all(fetches).await {
            match result {
                Ok(quote) => {
                    tracing::info!(source = %kind, price = %quote.value, "💱 Quote received");
                    collection.quotes.push(quote);
                }
                Err(e) => {
                    tracing::warn!(source = %kind, error = %e, "Quote fetch failed");
                    collection.failures.push(CycleError::QuoteFetchFailed {
                        feed: kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            received = collection.quotes.len(),
            failed = collection.failures.len(),
            "Quote collection finished"
        );

        collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Instant;

    struct StubSource {
        kind: QuoteSourceKind,
        delay: Duration,
        result: Result<Decimal, QuoteError>,
    }

    #[async_trait]
    impl QuoteSource for StubSource {
        fn kind(&self) -> QuoteSourceKind {
            self.kind
        }

        async fn fetch_quote(&self) -> Result<PriceQuote, QuoteError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone().map(|value| PriceQuote {
                source: self.kind,
                value,
                observed_at: Utc::now(),
            })
        }
    }

    fn stub(
        kind: QuoteSourceKind,
        delay_ms: u64,
        result: Result<Decimal, QuoteError>,
    ) -> Box<dyn QuoteSource> {
        Box::new(StubSource {
            kind,
            delay: Duration::from_millis(delay_ms),
            result,
        })
    }

    #[tokio::test]
    async fn keeps_configuration_order_regardless_of_latency() {
        let collector = QuoteCollector::new(
            vec![
                stub(QuoteSourceKind::Binance, 40, Ok(dec!(7.10))),
                stub(QuoteSourceKind::Okx, 0, Ok(dec!(7.30))),
            ],
            Duration::from_secs(1),
        );

        let collection = collector.collect().await;
        let sources: Vec<_> = collection.quotes.iter().map(|q| q.source).collect();
        assert_eq!(sources, vec![QuoteSourceKind::Binance, QuoteSourceKind::Okx]);
        assert!(collection.failures.is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_others() {
        let collector = QuoteCollector::new(
            vec![
                stub(QuoteSourceKind::Binance, 0, Err(QuoteError::Status(503))),
                stub(QuoteSourceKind::Okx, 0, Ok(dec!(7.30))),
            ],
            Duration::from_secs(1),
        );

        let collection = collector.collect().await;
        assert_eq!(collection.quotes.len(), 1);
        assert_eq!(
            collection.failures,
            vec![CycleError::QuoteFetchFailed {
                feed: QuoteSourceKind::Binance,
                reason: "HTTP 503".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn slow_source_times_out_without_blocking_fast_one() {
        let collector = QuoteCollector::new(
            vec![
                stub(QuoteSourceKind::Binance, 5_000, Ok(dec!(7.10))),
                stub(QuoteSourceKind::Okx, 0, Ok(dec!(7.30))),
            ],
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let collection = collector.collect().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(collection.quotes.len(), 1);
        assert_eq!(collection.quotes[0].source, QuoteSourceKind::Okx);
        assert_eq!(collection.failures[0].kind(), crate::error::ErrorKind::QuoteFetchFailed);
    }
}
