//! Wallet capability
//!
//! Key material and signing live outside the updater. The core only needs an
//! address, a balance query and "send and wait for inclusion".

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use thiserror::Error;

use crate::chain::{Address, Cell, ChainClient, ChainError, ChainHead};

mod signing;

pub use signing::{CommandSigner, ExternalSigner, SigningWallet};

/// Outbound message mode flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendMode(u8);

impl SendMode {
    /// Fees are paid from the remaining balance, not from the sent amount
    pub const PAY_FEES_SEPARATELY: SendMode = SendMode(1);
    pub const IGNORE_ERRORS: SendMode = SendMode(2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, other: SendMode) -> SendMode {
        SendMode(self.0 | other.0)
    }
}

/// Internal message the wallet should sign and send
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub destination: Address,
    pub amount_nano: u64,
    /// Return funds if the destination fails to process the message
    pub bounce: bool,
    pub mode: SendMode,
    pub body: Arc<Cell>,
}

/// Transaction included on-chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: Vec<u8>,
    /// Block that confirmed the transaction
    pub block: ChainHead,
    /// Destination rejected the message and the funds came back
    pub bounced: bool,
}

impl SentTransaction {
    pub fn hash_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.hash)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("inclusion not observed in time")]
    Timeout,

    #[error("wallet backend unavailable: {0}")]
    Unavailable(String),
}

impl From<ChainError> for WalletError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Unavailable(msg) => WalletError::Unavailable(msg),
            other => WalletError::Rejected(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Wallet: Send + Sync {
    fn address(&self) -> Address;

    /// Balance in nano-TON as of `head`
    async fn balance(&self, head: &ChainHead) -> Result<u64, WalletError>;

    /// Sign and send, then block until the transaction is included
    async fn send_and_wait(&self, request: &TransferRequest)
        -> Result<SentTransaction, WalletError>;
}

/// Wallet without key material: balances work, sending is refused
///
/// Used for dry runs and for monitoring a price admin account whose keys are
/// held by an external signer.
pub struct WatchOnlyWallet {
    address: Address,
    chain: Arc<dyn ChainClient>,
}

impl WatchOnlyWallet {
    pub fn new(address: Address, chain: Arc<dyn ChainClient>) -> Self {
        Self { address, chain }
    }
}

#[async_trait]
impl Wallet for WatchOnlyWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn balance(&self, head: &ChainHead) -> Result<u64, WalletError> {
        Ok(self.chain.get_balance(head, &self.address).await?)
    }

    async fn send_and_wait(
        &self,
        request: &TransferRequest,
    ) -> Result<SentTransaction, WalletError> {
        tracing::warn!(
            wallet = %self.address,
            destination = %request.destination,
            "Watch-only wallet cannot sign; message not sent"
        );
        Err(WalletError::Rejected(
            "watch-only wallet holds no signing key".to_string(),
        ))
    }
}
