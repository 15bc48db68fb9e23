//! Error kinds surfaced by an update cycle

use std::fmt;
use thiserror::Error;

use crate::types::QuoteSourceKind;

/// Everything that can end an update cycle early
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("contract call failed: {0}")]
    ContractCallFailed(String),

    /// Per-source soft failure; absorbed by the collector
    #[error("quote fetch from {feed} failed: {reason}")]
    QuoteFetchFailed {
        feed: QuoteSourceKind,
        reason: String,
    },

    #[error("insufficient quotes: got {got}, need at least {required}")]
    InsufficientQuotes { got: usize, required: usize },

    #[error("invalid aggregate: {0}")]
    InvalidAggregate(String),

    #[error("balance {balance} below threshold {threshold}")]
    LowBalance { balance: u64, threshold: u64 },

    #[error("payload encoding failed: {0}")]
    PayloadEncoding(String),

    #[error("submission not confirmed within {0}s")]
    SubmitTimeout(u64),

    #[error("submission rejected: {0}")]
    SubmitRejected(String),

    #[error("update bounced by contract (tx {0})")]
    UpdateBounced(String),

    #[error("balance query failed: {0}")]
    BalanceQueryFailed(String),

    #[error("cycle cancelled: deadline exceeded")]
    Cancelled,
}

/// Result tag without payload, for reporting and matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ChainUnavailable,
    ContractCallFailed,
    QuoteFetchFailed,
    InsufficientQuotes,
    InvalidAggregate,
    LowBalance,
    PayloadEncoding,
    SubmitTimeout,
    SubmitRejected,
    UpdateBounced,
    BalanceQueryFailed,
    Cancelled,
}

impl CycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CycleError::ChainUnavailable(_) => ErrorKind::ChainUnavailable,
            CycleError::ContractCallFailed(_) => ErrorKind::ContractCallFailed,
            CycleError::QuoteFetchFailed { .. } => ErrorKind::QuoteFetchFailed,
            CycleError::InsufficientQuotes { .. } => ErrorKind::InsufficientQuotes,
            CycleError::InvalidAggregate(_) => ErrorKind::InvalidAggregate,
            CycleError::LowBalance { .. } => ErrorKind::LowBalance,
            CycleError::PayloadEncoding(_) => ErrorKind::PayloadEncoding,
            CycleError::SubmitTimeout(_) => ErrorKind::SubmitTimeout,
            CycleError::SubmitRejected(_) => ErrorKind::SubmitRejected,
            CycleError::UpdateBounced(_) => ErrorKind::UpdateBounced,
            CycleError::BalanceQueryFailed(_) => ErrorKind::BalanceQueryFailed,
            CycleError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ChainUnavailable => "CHAIN_UNAVAILABLE",
            ErrorKind::ContractCallFailed => "CONTRACT_CALL_FAILED",
            ErrorKind::QuoteFetchFailed => "QUOTE_FETCH_FAILED",
            ErrorKind::InsufficientQuotes => "INSUFFICIENT_QUOTES",
            ErrorKind::InvalidAggregate => "INVALID_AGGREGATE",
            ErrorKind::LowBalance => "LOW_BALANCE",
            ErrorKind::PayloadEncoding => "PAYLOAD_ENCODING",
            ErrorKind::SubmitTimeout => "SUBMIT_TIMEOUT",
            ErrorKind::SubmitRejected => "SUBMIT_REJECTED",
            ErrorKind::UpdateBounced => "UPDATE_BOUNCED",
            ErrorKind::BalanceQueryFailed => "BALANCE_QUERY_FAILED",
            ErrorKind::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = CycleError::InsufficientQuotes {
            got: 0,
            required: 1,
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientQuotes);
        assert_eq!(err.kind().to_string(), "INSUFFICIENT_QUOTES");
        assert_eq!(CycleError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn messages_carry_context() {
        let err = CycleError::QuoteFetchFailed {
            feed: QuoteSourceKind::Okx,
            reason: "HTTP 503".to_string(),
        };
        assert_eq!(err.to_string(), "quote fetch from OKX failed: HTTP 503");
    }
}
