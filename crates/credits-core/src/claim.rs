//! Reward claim: the asynchronous guarded transaction.
//!
//! Preconditions are checked synchronously, so a doomed claim never enters
//! the pending phase. The settlement wait runs under a defensive timeout, and
//! the debit after resumption re-checks funds against the live balance rather
//! than trusting the earlier check.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::error::LedgerError;
use crate::identity::IdentityProvider;
use crate::settlement::Settlement;
use crate::store::LedgerStore;
use crate::types::{EntryMethod, HistoryEntry};

/// Observable state of the claim flow, exposed to the view binding as one
/// discriminated value instead of scattered booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    Idle,
    Pending,
    Completed,
    Failed,
}

impl OperationPhase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Single-writer phase publisher shared by the claim and redemption flows.
#[derive(Debug)]
pub struct PhaseSignal {
    tx: watch::Sender<OperationPhase>,
    rx: watch::Receiver<OperationPhase>,
}

impl PhaseSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(OperationPhase::Idle);
        Self { tx, rx }
    }

    pub fn set(&self, phase: OperationPhase) {
        self.tx.send_replace(phase);
    }

    pub fn current(&self) -> OperationPhase {
        *self.rx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<OperationPhase> {
        self.rx.clone()
    }
}

impl Default for PhaseSignal {
    fn default() -> Self {
        Self::new()
    }
}

const DEFAULT_SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Claim flow against one ledger store.
pub struct ClaimOperation {
    store: Arc<Mutex<LedgerStore>>,
    identity: Arc<dyn IdentityProvider>,
    settlement: Arc<dyn Settlement>,
    settlement_timeout: Duration,
    phase: PhaseSignal,
}

impl ClaimOperation {
    pub fn new(
        store: Arc<Mutex<LedgerStore>>,
        identity: Arc<dyn IdentityProvider>,
        settlement: Arc<dyn Settlement>,
    ) -> Self {
        Self {
            store,
            identity,
            settlement,
            settlement_timeout: DEFAULT_SETTLEMENT_TIMEOUT,
            phase: PhaseSignal::new(),
        }
    }

    pub fn with_settlement_timeout(mut self, timeout: Duration) -> Self {
        self.settlement_timeout = timeout;
        self
    }

    /// Current phase of the most recent claim.
    pub fn phase(&self) -> OperationPhase {
        self.phase.current()
    }

    /// Watch phase transitions, e.g. to disable the triggering control while
    /// a claim is pending.
    pub fn watch_phase(&self) -> watch::Receiver<OperationPhase> {
        self.phase.watch()
    }

    /// Spend `cost` for `reward_name` after simulated settlement.
    ///
    /// Either the full effect is observable afterwards (balance reduced, one
    /// new history entry) or no effect at all.
    pub async fn claim(
        &self,
        reward_name: &str,
        cost: u64,
    ) -> Result<HistoryEntry, LedgerError> {
        let user = self
            .identity
            .current_user()
            .ok_or(LedgerError::NotAuthenticated)?;
        if cost == 0 {
            return Err(LedgerError::InvalidAmount(cost));
        }

        // Synchronous precondition pass; also takes the in-flight mark so a
        // second submission cannot overlap the settlement wait. The mark
        // releases the ledger when dropped, whichever way this future ends.
        let _mark = {
            let store = self.store.lock().await;
            let available = store.balance();
            if cost > available {
                return Err(LedgerError::insufficient(cost, available));
            }
            store.begin_exclusive()?
        };

        self.phase.set(OperationPhase::Pending);

        let settled = match tokio::time::timeout(
            self.settlement_timeout,
            self.settlement.settle(reward_name, cost),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LedgerError::SettlementTimeout {
                timeout_ms: self.settlement_timeout.as_millis() as u64,
            }),
        };

        let mut store = self.store.lock().await;
        if let Err(err) = settled {
            self.phase.set(OperationPhase::Failed);
            warn!(
                user_id = %user.id,
                reward = reward_name,
                error = %err,
                "claim settlement failed, ledger untouched"
            );
            return Err(err);
        }

        // Authoritative re-check: the debit validates against the live
        // balance, not the one seen before suspension.
        match store.debit(cost, reward_name, EntryMethod::Claim).await {
            Ok(entry) => {
                self.phase.set(OperationPhase::Completed);
                info!(
                    user_id = %user.id,
                    reward = reward_name,
                    cost,
                    balance = store.balance(),
                    "claim settled"
                );
                Ok(entry)
            }
            Err(err) => {
                self.phase.set(OperationPhase::Failed);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use crate::settlement::FixedDelaySettlement;
    use crate::types::{Resource, UserProfile};
    use async_trait::async_trait;

    struct SignedIn;

    impl IdentityProvider for SignedIn {
        fn current_user(&self) -> Option<UserProfile> {
            Some(UserProfile::new("user-1", "Sam", "sam@example.com"))
        }
    }

    struct SignedOut;

    impl IdentityProvider for SignedOut {
        fn current_user(&self) -> Option<UserProfile> {
            None
        }
    }

    struct RefusesToSettle;

    #[async_trait]
    impl Settlement for RefusesToSettle {
        async fn settle(&self, _reference: &str, _amount: u64) -> Result<(), LedgerError> {
            Err(LedgerError::SettlementFailed("card declined".to_string()))
        }
    }

    struct NeverSettles;

    #[async_trait]
    impl Settlement for NeverSettles {
        async fn settle(&self, _reference: &str, _amount: u64) -> Result<(), LedgerError> {
            std::future::pending().await
        }
    }

    async fn rewards_store() -> Arc<Mutex<LedgerStore>> {
        let kv = Arc::new(MemoryKvStore::new());
        Arc::new(Mutex::new(
            LedgerStore::open("user-1", Resource::Rewards, kv).await,
        ))
    }

    fn operation(store: Arc<Mutex<LedgerStore>>, settlement: Arc<dyn Settlement>) -> ClaimOperation {
        ClaimOperation::new(store, Arc::new(SignedIn), settlement)
    }

    #[tokio::test]
    async fn claim_debits_once_then_runs_dry() {
        let store = rewards_store().await;
        let op = operation(store.clone(), Arc::new(FixedDelaySettlement::instant()));

        let entry = op.claim("VIP Pass", 10_000).await.unwrap();
        assert_eq!(entry.delta, -10_000);
        assert_eq!(entry.method, EntryMethod::Claim);
        assert_eq!(op.phase(), OperationPhase::Completed);
        {
            let store = store.lock().await;
            assert_eq!(store.balance(), 2_500);
            assert_eq!(store.history_snapshot().len(), 1);
        }

        let err = op.claim("VIP Pass", 10_000).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        let store = store.lock().await;
        assert_eq!(store.balance(), 2_500);
        assert_eq!(store.history_snapshot().len(), 1);
    }

    #[tokio::test]
    async fn anonymous_claims_never_reach_pending() {
        let store = rewards_store().await;
        let op = ClaimOperation::new(
            store.clone(),
            Arc::new(SignedOut),
            Arc::new(FixedDelaySettlement::instant()),
        );

        let err = op.claim("VIP Pass", 100).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotAuthenticated));
        assert_eq!(op.phase(), OperationPhase::Idle);
        assert!(!store.lock().await.is_in_flight());
    }

    #[tokio::test]
    async fn failure_after_suspension_leaves_state_untouched() {
        let store = rewards_store().await;
        let op = operation(store.clone(), Arc::new(RefusesToSettle));

        let before = {
            let store = store.lock().await;
            (store.balance(), store.history_snapshot())
        };

        let err = op.claim("VIP Pass", 10_000).await.unwrap_err();
        assert!(matches!(err, LedgerError::SettlementFailed(_)));
        assert_eq!(op.phase(), OperationPhase::Failed);

        let store = store.lock().await;
        assert_eq!(store.balance(), before.0);
        assert_eq!(store.history_snapshot(), before.1);
        assert!(!store.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn settlement_timeout_releases_the_guard() {
        let store = rewards_store().await;
        let op = operation(store.clone(), Arc::new(NeverSettles))
            .with_settlement_timeout(Duration::from_secs(3));

        let err = op.claim("VIP Pass", 10_000).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::SettlementTimeout { timeout_ms: 3_000 }
        ));

        let store = store.lock().await;
        assert_eq!(store.balance(), 12_500);
        assert!(store.history_snapshot().is_empty());
        assert!(!store.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_claim_fails_fast_while_first_settles() {
        let store = rewards_store().await;
        let op = Arc::new(operation(
            store.clone(),
            Arc::new(FixedDelaySettlement::new(Duration::from_secs(2))),
        ));

        let first = tokio::spawn({
            let op = op.clone();
            async move { op.claim("VIP Pass", 10_000).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(op.phase(), OperationPhase::Pending);

        let err = op.claim("Sticker Pack", 100).await.unwrap_err();
        assert!(matches!(err, LedgerError::OperationInFlight));

        first.await.unwrap().unwrap();
        let store = store.lock().await;
        assert_eq!(store.balance(), 2_500);
        assert_eq!(store.history_snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_claim_releases_the_ledger() {
        let store = rewards_store().await;
        let op = Arc::new(operation(
            store.clone(),
            Arc::new(FixedDelaySettlement::new(Duration::from_secs(2))),
        ));

        let abandoned = tokio::spawn({
            let op = op.clone();
            async move { op.claim("VIP Pass", 10_000).await }
        });
        tokio::task::yield_now().await;
        assert!(store.lock().await.is_in_flight());

        // Dropping the suspended future must clear the in-flight mark.
        abandoned.abort();
        assert!(abandoned.await.unwrap_err().is_cancelled());
        {
            let store = store.lock().await;
            assert!(!store.is_in_flight());
            assert_eq!(store.balance(), 12_500);
            assert!(store.history_snapshot().is_empty());
        }

        // And the ledger accepts a fresh claim afterwards.
        op.claim("VIP Pass", 10_000).await.unwrap();
        assert_eq!(store.lock().await.balance(), 2_500);
    }
}
