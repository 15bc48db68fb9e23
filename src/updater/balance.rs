//! Balance guard - refuses to submit from an underfunded wallet

use crate::error::CycleError;

/// `true` iff `balance` covers `threshold` (boundary passes)
pub fn check_sufficient(balance: u64, threshold: u64) -> bool {
    balance >= threshold
}

#[derive(Debug, Clone, Copy)]
pub struct BalanceGuard {
    /// Minimum nano-TON: transfer amount plus fee margin
    threshold: u64,
}

impl BalanceGuard {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn check(&self, balance: u64) -> Result<(), CycleError> {
        if check_sufficient(balance, self.threshold) {
            Ok(())
        } else {
            Err(CycleError::LowBalance {
                balance,
                threshold: self.threshold,
            })
        }
    }
}
