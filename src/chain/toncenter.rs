//! toncenter HTTP API v2 client
//!
//! Endpoints documented at: https://toncenter.com/api/v2/

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{Address, Cell, ChainClient, ChainError, ChainHead, StackValue};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MasterchainInfo {
    last: BlockIdExt,
}

#[derive(Debug, Deserialize)]
struct BlockIdExt {
    workchain: i32,
    shard: String,
    seqno: u32,
    root_hash: String,
    file_hash: String,
}

#[derive(Debug, Serialize)]
struct RunGetMethodRequest<'a> {
    address: String,
    method: &'a str,
    stack: Vec<Value>,
    seqno: u32,
}

#[derive(Debug, Deserialize)]
struct RunGetMethodResult {
    #[serde(default)]
    gas_used: u64,
    stack: Vec<Value>,
    exit_code: i64,
}

#[derive(Debug, Deserialize)]
struct AddressInformation {
    balance: Value,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Serialize)]
struct SendBocRequest {
    /// Base64 bag-of-cells of a signed external message
    boc: String,
}

/// Chain client backed by a toncenter-compatible HTTP endpoint
pub struct TonCenterClient {
    client: Client,
    base_url: String,
}

impl TonCenterClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                "X-API-Key",
                HeaderValue::from_str(key.trim()).context("Invalid toncenter API key")?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ChainError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(e) => {
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(ChainError::Unavailable(format!("HTTP {}", status)));
                }
                return Err(ChainError::Malformed(format!(
                    "HTTP {}: {}",
                    status, e
                )));
            }
        };

        if !envelope.ok {
            let msg = envelope.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(match envelope.code {
                Some(code) if code >= 500 || code == 429 => {
                    ChainError::Unavailable(format!("{} ({})", msg, code))
                }
                Some(code) => ChainError::Rejected(format!("{} ({})", msg, code)),
                None => ChainError::Rejected(msg),
            });
        }

        envelope
            .result
            .ok_or_else(|| ChainError::Malformed("missing result".to_string()))
    }
}

#[async_trait]
impl ChainClient for TonCenterClient {
    async fn current_head(&self) -> Result<ChainHead, ChainError> {
        let url = format!("{}/getMasterchainInfo", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let info: MasterchainInfo = Self::unwrap_envelope(response).await?;
        block_to_head(info.last)
    }

    async fn run_get_method(
        &self,
        head: &ChainHead,
        address: &Address,
        method: &str,
    ) -> Result<Vec<StackValue>, ChainError> {
        let url = format!("{}/runGetMethod", self.base_url);
        let request = RunGetMethodRequest {
            address: address.to_raw(),
            method,
            stack: Vec::new(),
            seqno: head.seqno,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let result: RunGetMethodResult = Self::unwrap_envelope(response).await?;
        tracing::debug!(
            method = %method,
            exit_code = result.exit_code,
            gas_used = result.gas_used,
            "Get-method executed"
        );

        // 0 and 1 are both successful TVM exit codes
        if result.exit_code != 0 && result.exit_code != 1 {
            return Err(ChainError::GetMethodFailed {
                method: method.to_string(),
                exit_code: result.exit_code,
            });
        }

        result.stack.iter().map(parse_stack_entry).collect()
    }

    async fn get_balance(&self, head: &ChainHead, address: &Address) -> Result<u64, ChainError> {
        let url = format!("{}/getAddressInformation", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("address", address.to_raw()),
                ("seqno", head.seqno.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let info: AddressInformation = Self::unwrap_envelope(response).await?;
        let balance = parse_balance(&info.balance)?;
        tracing::debug!(
            block = %head,
            address = %address,
            state = %info.state,
            balance,
            "Balance fetched"
        );
        Ok(balance)
    }

    async fn send_boc(&self, boc: &[u8]) -> Result<(), ChainError> {
        let url = format!("{}/sendBoc", self.base_url);
        let request = SendBocRequest {
            boc: general_purpose::STANDARD.encode(boc),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;

        let _accepted: Value = Self::unwrap_envelope(response).await?;
        tracing::debug!(bytes = boc.len(), "External message accepted");
        Ok(())
    }
}

fn block_to_head(block: BlockIdExt) -> Result<ChainHead, ChainError> {
    let shard = block
        .shard
        .parse::<i64>()
        .map_err(|_| ChainError::Malformed(format!("bad shard '{}'", block.shard)))?;
    Ok(ChainHead {
        workchain: block.workchain,
        shard,
        seqno: block.seqno,
        root_hash: block.root_hash,
        file_hash: block.file_hash,
    })
}

fn parse_balance(value: &Value) -> Result<u64, ChainError> {
    match value {
        Value::String(s) => s.parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
    .ok_or_else(|| ChainError::Malformed(format!("bad balance {}", value)))
}

/// Decode one `[type, value]` entry of a toncenter get-method stack
fn parse_stack_entry(entry: &Value) -> Result<StackValue, ChainError> {
    let malformed = || ChainError::Malformed(format!("bad stack entry {}", entry));
    let parts = entry.as_array().ok_or_else(malformed)?;
    let kind = parts.first().and_then(Value::as_str).ok_or_else(malformed)?;

    match kind {
        "num" | "int" => {
            let raw = parts.get(1).and_then(Value::as_str).ok_or_else(malformed)?;
            parse_tvm_int(raw).map(StackValue::Int).ok_or_else(malformed)
        }
        "cell" | "slice" => {
            let bytes = parts
                .get(1)
                .and_then(|v| v.get("bytes"))
                .and_then(Value::as_str)
                .ok_or_else(malformed)?;
            let boc = general_purpose::STANDARD
                .decode(bytes)
                .map_err(|e| ChainError::Malformed(format!("bad cell base64: {}", e)))?;
            let cell = Cell::from_boc(&boc).map_err(|e| ChainError::Malformed(e.to_string()))?;
            Ok(StackValue::Cell(cell))
        }
        "null" => Ok(StackValue::Null),
        other => Err(ChainError::Malformed(format!(
            "unsupported stack entry type '{}'",
            other
        ))),
    }
}

fn parse_tvm_int(raw: &str) -> Option<i128> {
    let (negative, body) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let value = match body.strip_prefix("0x") {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => body.parse::<i128>().ok()?,
    };
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CellBuilder;
    use serde_json::json;

    #[test]
    fn parses_masterchain_info() {
        let body = json!({
            "ok": true,
            "result": {
                "@type": "blocks.masterchainInfo",
                "last": {
                    "@type": "ton.blockIdExt",
                    "workchain": -1,
                    "shard": "-9223372036854775808",
                    "seqno": 41_000_123,
                    "root_hash": "cm9vdA==",
                    "file_hash": "ZmlsZQ=="
                }
            }
        });
        let env: Envelope<MasterchainInfo> = serde_json::from_value(body).unwrap();
        let head = block_to_head(env.result.unwrap().last).unwrap();
        assert_eq!(head.workchain, -1);
        assert_eq!(head.shard, i64::MIN);
        assert_eq!(head.seqno, 41_000_123);
    }

    #[test]
    fn parses_hex_numbers_including_negative() {
        assert_eq!(
            parse_stack_entry(&json!(["num", "0x2d0"])).unwrap(),
            StackValue::Int(720)
        );
        assert_eq!(
            parse_stack_entry(&json!(["num", "-0x1"])).unwrap(),
            StackValue::Int(-1)
        );
        assert!(parse_stack_entry(&json!(["num", "0xzz"])).is_err());
    }

    #[test]
    fn parses_address_slice_entry() {
        let addr = Address::new(0, [9; 32]);
        let mut b = CellBuilder::new();
        b.store_address(&addr).unwrap();
        let bytes = general_purpose::STANDARD.encode(b.end_cell().to_boc());

        let entry = json!(["cell", { "bytes": bytes, "object": {} }]);
        match parse_stack_entry(&entry).unwrap() {
            StackValue::Cell(cell) => assert_eq!(cell.parser().load_address().unwrap(), addr),
            other => panic!("expected cell, got {:?}", other),
        }
    }

    #[test]
    fn unknown_entry_type_is_malformed() {
        let err = parse_stack_entry(&json!(["tuple", {"elements": []}])).unwrap_err();
        assert!(matches!(err, ChainError::Malformed(_)));
        assert_eq!(parse_stack_entry(&json!(["null"])).unwrap(), StackValue::Null);
    }

    #[test]
    fn corrupt_cell_entry_is_malformed_not_fatal() {
        let boc = [
            0xb5, 0xee, 0x9c, 0x72, 0x04, 0x01, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let entry = json!(["cell", { "bytes": general_purpose::STANDARD.encode(boc) }]);
        assert!(matches!(
            parse_stack_entry(&entry),
            Err(ChainError::Malformed(_))
        ));
    }

    #[test]
    fn parses_address_information_balance() {
        let body = json!({
            "ok": true,
            "result": {
                "@type": "raw.fullAccountState",
                "balance": "989000000",
                "code": "",
                "data": "",
                "state": "active"
            }
        });
        let env: Envelope<AddressInformation> = serde_json::from_value(body).unwrap();
        let info = env.result.unwrap();
        assert_eq!(info.state, "active");
        assert_eq!(parse_balance(&info.balance).unwrap(), 989_000_000);
    }

    #[test]
    fn send_boc_request_carries_base64() {
        let request = SendBocRequest {
            boc: general_purpose::STANDARD.encode([0xb5, 0xee, 0x9c, 0x72]),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "boc": "te6ccg==" })
        );
    }

    #[test]
    fn rejected_envelope_keeps_node_message() {
        let body = json!({ "ok": false, "error": "cannot apply external message", "code": 500 });
        let env: Envelope<Value> = serde_json::from_value(body).unwrap();
        assert!(!env.ok);
        assert_eq!(env.error.as_deref(), Some("cannot apply external message"));
    }

    #[test]
    fn balance_accepts_string_or_number() {
        assert_eq!(parse_balance(&json!("1500000000")).unwrap(), 1_500_000_000);
        assert_eq!(parse_balance(&json!(42)).unwrap(), 42);
        assert!(parse_balance(&json!("-5")).is_err());
    }
}
