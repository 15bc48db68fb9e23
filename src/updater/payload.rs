//! Update message construction and wire encoding
//!
//! Layout expected by the oracle contract, big-endian, one cell:
//! `op:uint32 | query_id:uint64 | price:uint32 | timestamp:uint32 | flags:uint8`

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::chain::{Cell, CellBuilder, CellError};
use crate::error::CycleError;
use crate::types::{AggregatedPrice, UpdateMessage};

/// Contract opcode for "set price"
pub const OP_UPDATE_PRICE: u32 = 1002;

/// Source of per-message query ids
pub trait QueryIdSource: Send + Sync {
    fn next_query_id(&self) -> u64;
}

/// Uniformly random 64-bit ids
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomQueryIds;

impl QueryIdSource for RandomQueryIds {
    fn next_query_id(&self) -> u64 {
        rand::random::<u64>()
    }
}

/// Deterministic ids counting up from a seed
#[derive(Debug)]
pub struct SequentialQueryIds {
    next: AtomicU64,
}

impl SequentialQueryIds {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl QueryIdSource for SequentialQueryIds {
    fn next_query_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

pub struct UpdatePayloadBuilder {
    op_code: u32,
    flags: u8,
    query_ids: Arc<dyn QueryIdSource>,
}

impl UpdatePayloadBuilder {
    pub fn new(op_code: u32, flags: u8, query_ids: Arc<dyn QueryIdSource>) -> Self {
        Self {
            op_code,
            flags,
            query_ids,
        }
    }

    pub fn build(
        &self,
        aggregated: &AggregatedPrice,
        now: DateTime<Utc>,
    ) -> Result<UpdateMessage, CycleError> {
        let submitted_at = u32::try_from(now.timestamp()).map_err(|_| {
            CycleError::PayloadEncoding(format!(
                "timestamp {} outside uint32 range",
                now.timestamp()
            ))
        })?;

        Ok(UpdateMessage {
            op_code: self.op_code,
            query_id: self.query_ids.next_query_id(),
            new_price: aggregated.value,
            submitted_at,
            flags: self.flags,
        })
    }
}

impl UpdateMessage {
    /// Encode as the message body cell (168 bits, no refs)
    pub fn to_cell(&self) -> Result<Cell, CellError> {
        let mut b = CellBuilder::new();
        b.store_uint(self.op_code as u64, 32)?
            .store_uint(self.query_id, 64)?
            .store_uint(self.new_price as u64, 32)?
            .store_uint(self.submitted_at as u64, 32)?
            .store_uint(self.flags as u64, 8)?;
        Ok(b.end_cell())
    }
}
