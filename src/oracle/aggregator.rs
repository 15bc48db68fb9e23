//! Oracle Aggregator - Combines quotes from multiple sources
//!
//! Averages the usable quotes of one cycle and scales the mean to the
//! contract's fixed-point resolution. Decimal arithmetic keeps the rounding
//! exact: `round_half_up(mean * scale_factor)`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::CycleError;
use crate::types::{AggregatedPrice, PriceQuote};

/// Price aggregator with a configurable rejection policy
#[derive(Debug, Clone)]
pub struct PriceAggregator {
    /// Fixed-point multiplier of the contract (100 = cents)
    scale_factor: u32,
    /// Minimum number of usable quotes
    min_sources: usize,
    /// Drop quotes further than this many percent from the median
    max_deviation_pct: Option<Decimal>,
}

impl PriceAggregator {
    pub fn new(scale_factor: u32, min_sources: usize, max_deviation_pct: Option<Decimal>) -> Self {
        Self {
            scale_factor,
            min_sources: min_sources.max(1),
            max_deviation_pct: max_deviation_pct.filter(|d| *d > Decimal::ZERO),
        }
    }

    pub fn aggregate(&self, quotes: &[PriceQuote]) -> Result<AggregatedPrice, CycleError> {
        let positive: Vec<&PriceQuote> = quotes.iter().filter(|q| q.value > Decimal::ZERO).collect();
        let usable = match self.max_deviation_pct {
            Some(max_dev) => Self::reject_outliers(positive, max_dev),
            None => positive,
        };

        if usable.len() < self.min_sources {
            return Err(CycleError::InsufficientQuotes {
                got: usable.len(),
                required: self.min_sources,
            });
        }

        let values: Vec<Decimal> = usable.iter().map(|q| q.value).collect();
        let sum = values
            .iter()
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
            .ok_or_else(|| CycleError::InvalidAggregate("sum overflow".to_string()))?;
        let mean = sum / Decimal::from(values.len());

        let scaled = mean
            .checked_mul(Decimal::from(self.scale_factor))
            .ok_or_else(|| CycleError::InvalidAggregate("scaled mean overflow".to_string()))?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

        if scaled <= Decimal::ZERO {
            return Err(CycleError::InvalidAggregate(format!(
                "mean {} scales to non-positive value {}",
                mean, scaled
            )));
        }
        let value = scaled.to_u32().ok_or_else(|| {
            CycleError::InvalidAggregate(format!("{} does not fit into 32 bits", scaled))
        })?;

        let spread = Self::calculate_spread(&values);

        tracing::info!(
            mean = %mean,
            value,
            sources = values.len(),
            spread = %spread,
            "📊 Price aggregated"
        );

        Ok(AggregatedPrice {
            value,
            source_count: values.len(),
            mean,
            spread,
            sources: usable.iter().map(|q| q.source).collect(),
        })
    }

    /// Calculate spread between highest and lowest price
    fn calculate_spread(values: &[Decimal]) -> Decimal {
        let min = values.iter().copied().min().unwrap_or(Decimal::ZERO);
        let max = values.iter().copied().max().unwrap_or(Decimal::ZERO);
        if min.is_zero() {
            return Decimal::ZERO;
        }
        (max - min) / min
    }

    fn median(values: &mut [Decimal]) -> Decimal {
        values.sort();
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / dec!(2)
        } else {
            values[mid]
        }
    }

    fn reject_outliers(quotes: Vec<&PriceQuote>, max_dev_pct: Decimal) -> Vec<&PriceQuote> {
        if quotes.is_empty() {
            return quotes;
        }
        let mut values: Vec<Decimal> = quotes.iter().map(|q| q.value).collect();
        let median = Self::median(&mut values);

        quotes
            .into_iter()
            .filter(|q| {
                let deviation = (q.value - median).abs() / median * dec!(100);
                if deviation > max_dev_pct {
                    tracing::warn!(
                        source = %q.source,
                        price = %q.value,
                        median = %median,
                        deviation_pct = %deviation.round_dp(2),
                        "Quote rejected as outlier"
                    );
                    false
                } else {
                    true
                }
            })
            .collect()
    }
}

impl Default for PriceAggregator {
    fn default() -> Self {
        Self::new(100, 1, None) // cents, any single source, no outlier filter
    }
}
