//! Signing wallet - external signer + chain broadcast
//!
//! Keys never enter this process. An [`ExternalSigner`] turns a transfer into
//! a signed external message; the wallet broadcasts it through the chain
//! client and waits until the wallet's seqno moves past the one it signed.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{SentTransaction, TransferRequest, Wallet, WalletError};
use crate::chain::{Address, Cell, ChainClient, ChainHead, StackValue};

/// Wallet contract get-method returning the next expected seqno
const SEQNO_METHOD: &str = "seqno";

/// Produces signed external messages for the price admin wallet
#[async_trait]
pub trait ExternalSigner: Send + Sync {
    /// Sign `request` as message number `seqno` of `wallet`; returns the external message BOC
    async fn sign_transfer(
        &self,
        wallet: &Address,
        request: &TransferRequest,
        seqno: u32,
    ) -> Result<Vec<u8>, WalletError>;
}

/// JSON document written to the signer command's stdin
#[derive(Debug, Serialize)]
struct SignRequest {
    wallet: String,
    destination: String,
    amount_nano: u64,
    bounce: bool,
    mode: u8,
    seqno: u32,
    /// Base64 BOC of the message body
    body_boc: String,
}

/// Signer backed by an external program
///
/// The program gets one [`SignRequest`] as JSON on stdin and must print the
/// base64 BOC of the signed external message on stdout.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
}

impl CommandSigner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl ExternalSigner for CommandSigner {
    async fn sign_transfer(
        &self,
        wallet: &Address,
        request: &TransferRequest,
        seqno: u32,
    ) -> Result<Vec<u8>, WalletError> {
        let input = serde_json::to_vec(&SignRequest {
            wallet: wallet.to_raw(),
            destination: request.destination.to_raw(),
            amount_nano: request.amount_nano,
            bounce: request.bounce,
            mode: request.mode.bits(),
            seqno,
            body_boc: general_purpose::STANDARD.encode(request.body.to_boc()),
        })
        .map_err(|e| WalletError::Rejected(format!("sign request encoding: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WalletError::Unavailable(format!("signer {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| WalletError::Rejected(format!("signer stdin: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| WalletError::Rejected(format!("signer: {}", e)))?;

        if !output.status.success() {
            return Err(WalletError::Rejected(format!(
                "signer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        general_purpose::STANDARD
            .decode(stdout.trim())
            .map_err(|e| WalletError::Rejected(format!("signer output is not base64: {}", e)))
    }
}

/// Wallet that signs through an [`ExternalSigner`] and broadcasts via the chain
///
/// Inclusion is observed through the wallet seqno. The reported hash is the
/// external message hash. Bounce detection needs the transaction list, which
/// this wallet does not read, so `bounced` is always `false`.
pub struct SigningWallet {
    address: Address,
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn ExternalSigner>,
    poll_interval: Duration,
}

impl SigningWallet {
    pub fn new(
        address: Address,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn ExternalSigner>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            address,
            chain,
            signer,
            poll_interval,
        }
    }

    async fn seqno_at(&self, head: &ChainHead) -> Result<u32, WalletError> {
        let stack = self
            .chain
            .run_get_method(head, &self.address, SEQNO_METHOD)
            .await?;
        match stack.first() {
            Some(StackValue::Int(n)) => u32::try_from(*n)
                .map_err(|_| WalletError::Rejected(format!("seqno {} out of range", n))),
            other => Err(WalletError::Rejected(format!(
                "unexpected seqno result {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl Wallet for SigningWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn balance(&self, head: &ChainHead) -> Result<u64, WalletError> {
        Ok(self.chain.get_balance(head, &self.address).await?)
    }

    /// Never gives up on its own; callers bound it with a timeout
    async fn send_and_wait(
        &self,
        request: &TransferRequest,
    ) -> Result<SentTransaction, WalletError> {
        let head = self.chain.current_head().await?;
        let seqno = self.seqno_at(&head).await?;

        let boc = self.signer.sign_transfer(&self.address, request, seqno).await?;
        let message = Cell::from_boc(&boc)
            .map_err(|e| WalletError::Rejected(format!("signer produced invalid BOC: {}", e)))?;
        let hash = message.hash().to_vec();

        self.chain.send_boc(&boc).await?;
        tracing::info!(
            wallet = %self.address,
            seqno,
            msg_hash = %general_purpose::STANDARD.encode(&hash),
            "📨 External message broadcast, waiting for inclusion..."
        );

        loop {
            tokio::time::sleep(self.poll_interval).await;

            let head = match self.chain.current_head().await {
                Ok(head) => head,
                Err(e) => {
                    tracing::warn!(error = %e, "Head refresh failed while waiting");
                    continue;
                }
            };
            match self.seqno_at(&head).await {
                Ok(current) if current > seqno => {
                    return Ok(SentTransaction {
                        hash,
                        block: head,
                        bounced: false,
                    });
                }
                Ok(_) => tracing::debug!(block = %head, "Message not included yet"),
                Err(e) => tracing::warn!(error = %e, "Seqno poll failed while waiting"),
            }
        }
    }
}
