//! Settlement seam for claim and redemption flows.
//!
//! Production wiring waits out a realistic confirmation delay; tests inject a
//! zero-latency or failing settlement instead of sleeping.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::LedgerError;

/// External confirmation step awaited before a claim or redemption is final.
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Confirm that `amount` may move for `reference`. An error here leaves
    /// the ledger untouched.
    async fn settle(&self, reference: &str, amount: u64) -> Result<(), LedgerError>;
}

/// Settlement that confirms after a fixed delay.
///
/// `Duration::ZERO` makes it synchronous in effect, which is what the core
/// test suite uses.
#[derive(Debug, Clone)]
pub struct FixedDelaySettlement {
    delay: Duration,
}

impl FixedDelaySettlement {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Confirms immediately. Intended for tests and demos.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl Default for FixedDelaySettlement {
    fn default() -> Self {
        // Roughly what the storefront shows as a "processing" spinner.
        Self::new(Duration::from_millis(1_500))
    }
}

#[async_trait]
impl Settlement for FixedDelaySettlement {
    async fn settle(&self, _reference: &str, _amount: u64) -> Result<(), LedgerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}
