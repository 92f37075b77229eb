//! View binding surface.
//!
//! `LedgerHandle` is the one object a page consumer holds: both resources'
//! balances and histories, the guarded mutations, and the two asynchronous
//! flows. It renders nothing and returns typed errors only.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::CodeCatalog;
use crate::claim::{ClaimOperation, OperationPhase};
use crate::error::LedgerError;
use crate::identity::IdentityProvider;
use crate::kv::KeyValueStore;
use crate::redeem::CodeValidator;
use crate::settlement::Settlement;
use crate::store::LedgerStore;
use crate::types::{EntryMethod, HistoryEntry, RedeemResult, Resource, UserProfile};

/// Per-session handle over one user's wallet and rewards ledgers.
pub struct LedgerHandle {
    user: UserProfile,
    wallet: Arc<Mutex<LedgerStore>>,
    rewards: Arc<Mutex<LedgerStore>>,
    claim_op: ClaimOperation,
    validator: CodeValidator,
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl LedgerHandle {
    /// Open both ledgers for the signed-in user.
    ///
    /// Claims debit the rewards ledger; redeemed codes credit the wallet.
    pub async fn open(
        identity: Arc<dyn IdentityProvider>,
        kv: Arc<dyn KeyValueStore>,
        settlement: Arc<dyn Settlement>,
    ) -> Result<Self, LedgerError> {
        Self::open_with_catalog(identity, kv, settlement, CodeCatalog::standard()).await
    }

    pub async fn open_with_catalog(
        identity: Arc<dyn IdentityProvider>,
        kv: Arc<dyn KeyValueStore>,
        settlement: Arc<dyn Settlement>,
        catalog: CodeCatalog,
    ) -> Result<Self, LedgerError> {
        let user = identity.current_user().ok_or(LedgerError::NotAuthenticated)?;

        let wallet = Arc::new(Mutex::new(
            LedgerStore::open(user.id.clone(), Resource::Wallet, kv.clone()).await,
        ));
        let rewards = Arc::new(Mutex::new(
            LedgerStore::open(user.id.clone(), Resource::Rewards, kv).await,
        ));

        let claim_op = ClaimOperation::new(rewards.clone(), identity.clone(), settlement.clone());
        let validator = CodeValidator::new(wallet.clone(), identity, settlement, catalog);

        Ok(Self {
            user,
            wallet,
            rewards,
            claim_op,
            validator,
        })
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    fn store(&self, resource: Resource) -> &Arc<Mutex<LedgerStore>> {
        match resource {
            Resource::Wallet => &self.wallet,
            Resource::Rewards => &self.rewards,
        }
    }

    pub async fn balance(&self, resource: Resource) -> u64 {
        self.store(resource).lock().await.balance()
    }

    /// History for a resource, most recent first.
    pub async fn history(&self, resource: Resource) -> Vec<HistoryEntry> {
        self.store(resource).lock().await.history_snapshot()
    }

    pub async fn credit(
        &self,
        resource: Resource,
        amount: u64,
        description: impl Into<String>,
    ) -> Result<HistoryEntry, LedgerError> {
        self.store(resource)
            .lock()
            .await
            .credit(amount, description, EntryMethod::Credit)
            .await
    }

    pub async fn debit(
        &self,
        resource: Resource,
        amount: u64,
        description: impl Into<String>,
    ) -> Result<HistoryEntry, LedgerError> {
        self.store(resource)
            .lock()
            .await
            .debit(amount, description, EntryMethod::Debit)
            .await
    }

    /// Spend reward points for a catalog reward.
    pub async fn claim(&self, reward_name: &str, cost: u64) -> Result<HistoryEntry, LedgerError> {
        self.claim_op.claim(reward_name, cost).await
    }

    /// Redeem a gift-card / promo code into the wallet.
    pub async fn redeem_code(&self, code: &str) -> Result<RedeemResult, LedgerError> {
        self.validator.redeem(code).await
    }

    /// Phase of the most recent claim, for disabling the triggering control.
    pub fn claim_phase(&self) -> OperationPhase {
        self.claim_op.phase()
    }

    /// Phase of the most recent code redemption.
    pub fn redeem_phase(&self) -> OperationPhase {
        self.validator.phase()
    }
}
