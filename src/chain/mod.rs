//! Chain access - TON node capability and on-chain encodings
//!
//! The updater never talks to lite servers directly; it consumes the
//! [`ChainClient`] capability (fresh head, get-methods, balances). The
//! toncenter HTTP API is the bundled implementation.

pub mod address;
pub mod cell;
mod state_reader;
mod toncenter;

pub use address::{Address, AddressError};
pub use cell::{Cell, CellBuilder, CellError, CellSlice};
pub use state_reader::{decode_price_state, ChainStateReader};
pub use toncenter::TonCenterClient;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Reference to a masterchain block; reads are pinned to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    pub workchain: i32,
    pub shard: i64,
    pub seqno: u32,
    pub root_hash: String,
    pub file_hash: String,
}

impl fmt::Display for ChainHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{:x},{})", self.workchain, self.shard, self.seqno)
    }
}

/// TVM stack entry returned by a get-method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackValue {
    Int(i128),
    Cell(Arc<Cell>),
    Null,
}

impl StackValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            StackValue::Int(_) => "int",
            StackValue::Cell(_) => "cell",
            StackValue::Null => "null",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Transport-level failure; the node could not be reached
    #[error("node unavailable: {0}")]
    Unavailable(String),

    /// The API answered but refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("get-method {method} exited with code {exit_code}")]
    GetMethodFailed { method: String, exit_code: i64 },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Read access to the chain
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest masterchain block
    async fn current_head(&self) -> Result<ChainHead, ChainError>;

    /// Run a read-only get-method without arguments
    async fn run_get_method(
        &self,
        head: &ChainHead,
        address: &Address,
        method: &str,
    ) -> Result<Vec<StackValue>, ChainError>;

    /// Account balance in nano-TON as of `head`
    async fn get_balance(&self, head: &ChainHead, address: &Address) -> Result<u64, ChainError>;

    /// Broadcast a serialized, already signed external message
    async fn send_boc(&self, boc: &[u8]) -> Result<(), ChainError>;
}
