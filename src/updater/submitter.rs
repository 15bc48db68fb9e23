//! Transaction submitter - send, wait for inclusion, report the balance left

use std::sync::Arc;
use std::time::Duration;

use crate::chain::{Address, ChainClient, ChainHead};
use crate::error::CycleError;
use crate::types::UpdateMessage;
use crate::wallet::{SendMode, TransferRequest, Wallet, WalletError};

/// Confirmed update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Base64 transaction hash
    pub tx_hash: String,
    pub block: ChainHead,
    /// Wallet balance as of the confirming block
    pub new_balance: u64,
}

/// Failed submission with the balance re-queried afterwards, when available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitFailure {
    pub error: CycleError,
    pub balance: Option<u64>,
}

pub struct TransactionSubmitter {
    chain: Arc<dyn ChainClient>,
    confirm_timeout: Duration,
    bounce: bool,
}

impl TransactionSubmitter {
    pub fn new(chain: Arc<dyn ChainClient>, confirm_timeout: Duration, bounce: bool) -> Self {
        Self {
            chain,
            confirm_timeout,
            bounce,
        }
    }

    /// One submission attempt; never retried here
    pub async fn submit_and_confirm(
        &self,
        wallet: &dyn Wallet,
        destination: &Address,
        message: &UpdateMessage,
        amount_nano: u64,
        mode: SendMode,
    ) -> Result<SubmitReceipt, SubmitFailure> {
        let body = message.to_cell().map_err(|e| SubmitFailure {
            error: CycleError::PayloadEncoding(e.to_string()),
            balance: None,
        })?;

        let request = TransferRequest {
            destination: *destination,
            amount_nano,
            bounce: self.bounce,
            mode,
            body: Arc::new(body),
        };

        tracing::info!(
            destination = %destination,
            amount_nano,
            query_id = message.query_id,
            price = message.new_price,
            "📤 Sending transaction and waiting for confirmation..."
        );

        let sent = match tokio::time::timeout(self.confirm_timeout, wallet.send_and_wait(&request))
            .await
        {
            Ok(Ok(tx)) => tx,
            Ok(Err(e)) => {
                let error = match e {
                    WalletError::Timeout => CycleError::SubmitTimeout(self.confirm_timeout.as_secs()),
                    WalletError::Rejected(msg) => CycleError::SubmitRejected(msg),
                    WalletError::Unavailable(msg) => CycleError::ChainUnavailable(msg),
                };
                return Err(self.fail_with_balance(wallet, error, None).await);
            }
            Err(_) => {
                let error = CycleError::SubmitTimeout(self.confirm_timeout.as_secs());
                return Err(self.fail_with_balance(wallet, error, None).await);
            }
        };

        let tx_hash = sent.hash_base64();

        if sent.bounced {
            let error = CycleError::UpdateBounced(tx_hash);
            return Err(self.fail_with_balance(wallet, error, Some(&sent.block)).await);
        }

        tracing::info!(tx_hash = %tx_hash, block = %sent.block, "✅ Transaction confirmed");

        let new_balance = wallet.balance(&sent.block).await.map_err(|e| SubmitFailure {
            error: CycleError::BalanceQueryFailed(format!("after tx {}: {}", tx_hash, e)),
            balance: None,
        })?;

        tracing::info!(balance_left = new_balance, "💰 Balance after update");

        Ok(SubmitReceipt {
            tx_hash,
            block: sent.block,
            new_balance,
        })
    }

    /// Re-query the balance after a failed attempt so the report shows it
    async fn fail_with_balance(
        &self,
        wallet: &dyn Wallet,
        error: CycleError,
        at: Option<&ChainHead>,
    ) -> SubmitFailure {
        tracing::error!(error = %error, "Submission failed");

        let head = match at {
            Some(head) => Some(head.clone()),
            None => self.chain.current_head().await.ok(),
        };

        let balance = match head {
            Some(head) => match wallet.balance(&head).await {
                Ok(balance) => Some(balance),
                Err(e) => {
                    tracing::warn!(error = %e, "Balance re-query after failure failed");
                    None
                }
            },
            None => None,
        };

        if let Some(balance) = balance {
            tracing::info!(balance_left = balance, "💰 Balance after failed submission");
        }

        SubmitFailure { error, balance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainError, StackValue};
    use crate::wallet::SentTransaction;
    use async_trait::async_trait;

    struct HeadOnlyChain;

    #[async_trait]
    impl ChainClient for HeadOnlyChain {
        async fn current_head(&self) -> Result<ChainHead, ChainError> {
            Ok(head(99))
        }

        async fn run_get_method(
            &self,
            _head: &ChainHead,
            _address: &Address,
            _method: &str,
        ) -> Result<Vec<StackValue>, ChainError> {
            Ok(Vec::new())
        }

        async fn get_balance(
            &self,
            _head: &ChainHead,
            _address: &Address,
        ) -> Result<u64, ChainError> {
            Ok(0)
        }

        async fn send_boc(&self, _boc: &[u8]) -> Result<(), ChainError> {
            Ok(())
        }
    }

    enum Behaviour {
        Confirm { bounced: bool },
        /// Confirms, then every balance query fails
        ConfirmBalanceDown,
        Reject,
        Hang,
    }

    struct ScriptedWallet {
        behaviour: Behaviour,
        balance: u64,
    }

    #[async_trait]
    impl Wallet for ScriptedWallet {
        fn address(&self) -> Address {
            Address::new(0, [1; 32])
        }

        async fn balance(&self, _head: &ChainHead) -> Result<u64, WalletError> {
            match self.behaviour {
                Behaviour::ConfirmBalanceDown => {
                    Err(WalletError::Unavailable("lite server timeout".to_string()))
                }
                _ => Ok(self.balance),
            }
        }

        async fn send_and_wait(
            &self,
            _request: &TransferRequest,
        ) -> Result<SentTransaction, WalletError> {
            match self.behaviour {
                Behaviour::Confirm { bounced } => Ok(SentTransaction {
                    hash: vec![0xab; 32],
                    block: head(100),
                    bounced,
                }),
                Behaviour::ConfirmBalanceDown => Ok(SentTransaction {
                    hash: vec![0xcd; 32],
                    block: head(100),
                    bounced: false,
                }),
                Behaviour::Reject => Err(WalletError::Rejected("insufficient fee".to_string())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(WalletError::Timeout)
                }
            }
        }
    }

    fn head(seqno: u32) -> ChainHead {
        ChainHead {
            workchain: -1,
            shard: i64::MIN,
            seqno,
            root_hash: String::new(),
            file_hash: String::new(),
        }
    }

    fn message() -> UpdateMessage {
        UpdateMessage {
            op_code: 1002,
            query_id: 1,
            new_price: 720,
            submitted_at: 1_700_000_000,
            flags: 0,
        }
    }

    async fn submit(wallet: ScriptedWallet) -> Result<SubmitReceipt, SubmitFailure> {
        let submitter =
            TransactionSubmitter::new(Arc::new(HeadOnlyChain), Duration::from_millis(50), true);
        submitter
            .submit_and_confirm(
                &wallet,
                &Address::new(0, [2; 32]),
                &message(),
                10_000_000,
                SendMode::PAY_FEES_SEPARATELY,
            )
            .await
    }

    #[tokio::test]
    async fn confirmed_submission_reports_balance_at_confirming_block() {
        let receipt = submit(ScriptedWallet {
            behaviour: Behaviour::Confirm { bounced: false },
            balance: 880_000_000,
        })
        .await
        .unwrap();
        assert_eq!(receipt.block.seqno, 100);
        assert_eq!(receipt.new_balance, 880_000_000);
        assert_eq!(receipt.tx_hash.len(), 44);
    }

    #[tokio::test]
    async fn balance_failure_after_confirmation_is_reported() {
        let failure = submit(ScriptedWallet {
            behaviour: Behaviour::ConfirmBalanceDown,
            balance: 0,
        })
        .await
        .unwrap_err();
        assert_eq!(failure.error.kind(), crate::error::ErrorKind::BalanceQueryFailed);
        assert!(failure.error.to_string().contains("lite server timeout"));
        assert_eq!(failure.balance, None);
    }

    #[tokio::test]
    async fn bounced_submission_is_a_failure() {
        let failure = submit(ScriptedWallet {
            behaviour: Behaviour::Confirm { bounced: true },
            balance: 5,
        })
        .await
        .unwrap_err();
        assert!(matches!(failure.error, CycleError::UpdateBounced(_)));
        assert_eq!(failure.balance, Some(5));
    }

    #[tokio::test]
    async fn rejection_maps_to_submit_rejected() {
        let failure = submit(ScriptedWallet {
            behaviour: Behaviour::Reject,
            balance: 7,
        })
        .await
        .unwrap_err();
        assert_eq!(
            failure.error,
            CycleError::SubmitRejected("insufficient fee".to_string())
        );
        assert_eq!(failure.balance, Some(7));
    }

    #[tokio::test]
    async fn missing_confirmation_times_out_and_still_reports_balance() {
        let failure = submit(ScriptedWallet {
            behaviour: Behaviour::Hang,
            balance: 11,
        })
        .await
        .unwrap_err();
        assert_eq!(failure.error.kind(), crate::error::ErrorKind::SubmitTimeout);
        assert_eq!(failure.balance, Some(11));
    }
}
