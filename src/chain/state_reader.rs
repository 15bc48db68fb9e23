//! Reads the oracle contract's price state

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use super::{Address, ChainClient, ChainError, ChainHead, StackValue};
use crate::error::CycleError;
use crate::types::OnChainPriceState;

const PRICE_INFO_FIELDS: usize = 5;

pub struct ChainStateReader {
    client: Arc<dyn ChainClient>,
    method: String,
}

impl ChainStateReader {
    pub fn new(client: Arc<dyn ChainClient>, method: impl Into<String>) -> Self {
        Self {
            client,
            method: method.into(),
        }
    }

    /// Fresh masterchain head; get-methods need one to see recent state
    pub async fn chain_head(&self) -> Result<ChainHead, CycleError> {
        self.client
            .current_head()
            .await
            .map_err(|e| CycleError::ChainUnavailable(e.to_string()))
    }

    pub async fn read_state(
        &self,
        head: &ChainHead,
        contract: &Address,
    ) -> Result<OnChainPriceState, CycleError> {
        let stack = self
            .client
            .run_get_method(head, contract, &self.method)
            .await
            .map_err(|e| match e {
                ChainError::Unavailable(msg) => CycleError::ChainUnavailable(msg),
                other => CycleError::ContractCallFailed(other.to_string()),
            })?;

        let state = decode_price_state(&stack)?;

        tracing::info!(
            block = %head,
            current_price = %state.current_price,
            daily_initial_price = %state.daily_initial_price,
            last_updated_at = %state.last_updated_at.format("%Y-%m-%d %H:%M:%S"),
            price_admin = %state.price_admin,
            super_admin = %state.super_admin,
            "📖 Oracle state read"
        );

        Ok(state)
    }
}

/// Decode `(int price, int daily_initial, int updated_at, slice admin, slice super_admin)`
pub fn decode_price_state(stack: &[StackValue]) -> Result<OnChainPriceState, CycleError> {
    if stack.len() != PRICE_INFO_FIELDS {
        return Err(CycleError::ContractCallFailed(format!(
            "expected {} result fields, got {}",
            PRICE_INFO_FIELDS,
            stack.len()
        )));
    }

    let current_price = int_at(stack, 0)?;
    let daily_initial_price = int_at(stack, 1)?;
    let updated_at = int_at(stack, 2)?;
    let last_updated_at = unix_seconds(updated_at)?;
    let price_admin = address_at(stack, 3)?;
    let super_admin = address_at(stack, 4)?;

    Ok(OnChainPriceState {
        current_price,
        daily_initial_price,
        last_updated_at,
        price_admin,
        super_admin,
    })
}

fn int_at(stack: &[StackValue], idx: usize) -> Result<i128, CycleError> {
    match &stack[idx] {
        StackValue::Int(v) => Ok(*v),
        other => Err(CycleError::ContractCallFailed(format!(
            "field {} should be int, got {}",
            idx,
            other.type_name()
        ))),
    }
}

fn address_at(stack: &[StackValue], idx: usize) -> Result<Address, CycleError> {
    match &stack[idx] {
        StackValue::Cell(cell) => cell
            .parser()
            .load_address()
            .map_err(|e| CycleError::ContractCallFailed(format!("field {}: {}", idx, e))),
        other => Err(CycleError::ContractCallFailed(format!(
            "field {} should be slice, got {}",
            idx,
            other.type_name()
        ))),
    }
}

fn unix_seconds(ts: i128) -> Result<DateTime<Utc>, CycleError> {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| CycleError::ContractCallFailed(format!("timestamp {} out of range", ts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CellBuilder;

    fn addr_slice(byte: u8) -> StackValue {
        let mut b = CellBuilder::new();
        b.store_address(&Address::new(0, [byte; 32])).unwrap();
        StackValue::Cell(Arc::new(b.end_cell()))
    }

    fn valid_stack() -> Vec<StackValue> {
        vec![
            StackValue::Int(712),
            StackValue::Int(690),
            StackValue::Int(1_700_000_000),
            addr_slice(1),
            addr_slice(2),
        ]
    }

    #[test]
    fn decodes_price_info_tuple() {
        let state = decode_price_state(&valid_stack()).unwrap();
        assert_eq!(state.current_price, 712);
        assert_eq!(state.daily_initial_price, 690);
        assert_eq!(state.last_updated_at.timestamp(), 1_700_000_000);
        assert_eq!(state.price_admin, Address::new(0, [1; 32]));
        assert_eq!(state.super_admin, Address::new(0, [2; 32]));
    }

    #[test]
    fn wrong_field_count_is_contract_failure() {
        let mut stack = valid_stack();
        stack.pop();
        let err = decode_price_state(&stack).unwrap_err();
        assert!(matches!(err, CycleError::ContractCallFailed(_)));
    }

    #[test]
    fn wrong_field_type_is_contract_failure() {
        let mut stack = valid_stack();
        stack[0] = StackValue::Null;
        let err = decode_price_state(&stack).unwrap_err();
        assert_eq!(
            err,
            CycleError::ContractCallFailed("field 0 should be int, got null".to_string())
        );

        let mut stack = valid_stack();
        stack[3] = StackValue::Int(5);
        assert!(decode_price_state(&stack).is_err());
    }

    #[test]
    fn absurd_timestamp_is_rejected() {
        let mut stack = valid_stack();
        stack[2] = StackValue::Int(i128::MAX);
        assert!(decode_price_state(&stack).is_err());
    }
}
