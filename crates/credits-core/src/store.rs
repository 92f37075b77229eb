//! Per-(user, resource) ledger store.
//!
//! Owns one balance and its append-only history, hydrated from the key-value
//! adapter on open and written through after every successful mutation. The
//! in-memory pair is authoritative for the session; storage failures are
//! logged and swallowed at this boundary.
//!
//! Invariant handling:
//! - Balance and history always change together, inside one synchronous
//!   section, before any suspension point.
//! - A failed precondition changes nothing.
//! - History entries are immutable once appended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::kv::{balance_key, history_key, KeyValueStore};
use crate::types::{EntryMethod, HistoryEntry, Resource};

/// Ledger for one (user, resource) pair.
pub struct LedgerStore {
    user_id: String,
    resource: Resource,
    balance: u64,
    /// Insertion order, oldest first. Snapshots reverse this.
    history: Vec<HistoryEntry>,
    /// Set while a claim/redeem settlement wait is suspended.
    in_flight: Arc<AtomicBool>,
    kv: Arc<dyn KeyValueStore>,
}

/// Exclusivity mark handed out by [`LedgerStore::begin_exclusive`].
///
/// Clears the in-flight flag on drop, so the ledger is released on every exit
/// path of the operation that took it, including the operation's future being
/// dropped mid-wait.
#[derive(Debug)]
pub struct ExclusiveMark {
    flag: Arc<AtomicBool>,
}

impl Drop for ExclusiveMark {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl LedgerStore {
    /// Load the ledger for a user, seeding defaults when nothing (or nothing
    /// readable) is persisted.
    pub async fn open(
        user_id: impl Into<String>,
        resource: Resource,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        let user_id = user_id.into();
        let balance = load_balance(kv.as_ref(), resource, &user_id).await;
        let history = load_history(kv.as_ref(), resource, &user_id).await;
        debug!(
            user_id = %user_id,
            resource = resource.label(),
            balance,
            entries = history.len(),
            "ledger hydrated"
        );

        Self {
            user_id,
            resource,
            balance,
            history,
            in_flight: Arc::new(AtomicBool::new(false)),
            kv,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Current history, most recent first. Read-only and idempotent.
    pub fn history_snapshot(&self) -> Vec<HistoryEntry> {
        self.history.iter().rev().cloned().collect()
    }

    /// Add funds. `amount` must be positive; there is no upper bound.
    pub async fn credit(
        &mut self,
        amount: u64,
        description: impl Into<String>,
        method: EntryMethod,
    ) -> Result<HistoryEntry, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        self.balance += amount;
        let entry = HistoryEntry::completed(description, amount as i64, method);
        self.history.push(entry.clone());
        self.persist().await;
        Ok(entry)
    }

    /// Remove funds. Fails with `InsufficientBalance` when `amount` exceeds
    /// the current balance; nothing changes on failure.
    pub async fn debit(
        &mut self,
        amount: u64,
        description: impl Into<String>,
        method: EntryMethod,
    ) -> Result<HistoryEntry, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount > self.balance {
            return Err(LedgerError::insufficient(amount, self.balance));
        }

        self.balance -= amount;
        let entry = HistoryEntry::completed(description, -(amount as i64), method);
        self.history.push(entry.clone());
        self.persist().await;
        Ok(entry)
    }

    /// Mark this ledger as having a suspended operation in flight.
    ///
    /// A second overlapping claim/redeem fails fast instead of interleaving
    /// with the first one's settlement wait. The returned mark releases the
    /// ledger when dropped.
    pub fn begin_exclusive(&self) -> Result<ExclusiveMark, LedgerError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LedgerError::OperationInFlight);
        }
        Ok(ExclusiveMark {
            flag: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Write balance and history through to the key-value adapter.
    ///
    /// Best effort: a failed write is logged and otherwise ignored, since the
    /// in-memory state stays authoritative for this session.
    async fn persist(&self) {
        let bkey = balance_key(self.resource, &self.user_id);
        if let Err(err) = self.kv.set(&bkey, &self.balance.to_string()).await {
            warn!(key = %bkey, error = %err, "balance write-through failed");
        }

        let hkey = history_key(self.resource, &self.user_id);
        match serde_json::to_string(&self.history) {
            Ok(json) => {
                if let Err(err) = self.kv.set(&hkey, &json).await {
                    warn!(key = %hkey, error = %err, "history write-through failed");
                }
            }
            Err(err) => {
                warn!(key = %hkey, error = %err, "history serialization failed");
            }
        }
    }
}

async fn load_balance(kv: &dyn KeyValueStore, resource: Resource, user_id: &str) -> u64 {
    let key = balance_key(resource, user_id);
    match kv.get(&key).await {
        Ok(Some(raw)) => match raw.parse::<u64>() {
            Ok(balance) => balance,
            Err(err) => {
                warn!(key = %key, error = %err, "unreadable persisted balance, seeding default");
                resource.seed_balance()
            }
        },
        Ok(None) => resource.seed_balance(),
        Err(err) => {
            warn!(key = %key, error = %err, "storage unavailable on load, seeding default");
            resource.seed_balance()
        }
    }
}

async fn load_history(
    kv: &dyn KeyValueStore,
    resource: Resource,
    user_id: &str,
) -> Vec<HistoryEntry> {
    let key = history_key(resource, user_id);
    match kv.get(&key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(history) => history,
            Err(err) => {
                warn!(key = %key, error = %err, "unreadable persisted history, starting empty");
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!(key = %key, error = %err, "storage unavailable on load, starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    async fn rewards_store(kv: Arc<dyn KeyValueStore>) -> LedgerStore {
        LedgerStore::open("user-1", Resource::Rewards, kv).await
    }

    #[tokio::test]
    async fn seeds_defaults_on_first_access() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = rewards_store(kv.clone()).await;
        assert_eq!(store.balance(), Resource::Rewards.seed_balance());
        assert!(store.history_snapshot().is_empty());

        let wallet = LedgerStore::open("user-1", Resource::Wallet, kv).await;
        assert_eq!(wallet.balance(), 0);
    }

    #[tokio::test]
    async fn credit_and_debit_keep_balance_and_history_in_step() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut store = rewards_store(kv).await;
        let start = store.balance();

        store
            .credit(1_000, "Gift card", EntryMethod::Credit)
            .await
            .unwrap();
        store
            .debit(300, "Avatar frame", EntryMethod::Debit)
            .await
            .unwrap();

        let history = store.history_snapshot();
        assert_eq!(history.len(), 2);
        let total: i64 = history.iter().map(|e| e.delta).sum();
        assert_eq!(store.balance() as i64, start as i64 + total);
        // Most recent first.
        assert_eq!(history[0].delta, -300);
        assert_eq!(history[1].delta, 1_000);
    }

    #[tokio::test]
    async fn zero_amounts_are_rejected() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut store = rewards_store(kv).await;

        assert!(matches!(
            store.credit(0, "noop", EntryMethod::Credit).await,
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            store.debit(0, "noop", EntryMethod::Debit).await,
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(store.history_snapshot().is_empty());
    }

    #[tokio::test]
    async fn debit_boundary_drains_to_zero_but_never_below() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut store = rewards_store(kv).await;
        let balance = store.balance();

        let err = store
            .debit(balance + 1, "too much", EntryMethod::Debit)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { needed, available }
                if needed == balance + 1 && available == balance
        ));
        assert_eq!(store.balance(), balance);
        assert!(store.history_snapshot().is_empty());

        store
            .debit(balance, "drain", EntryMethod::Debit)
            .await
            .unwrap();
        assert_eq!(store.balance(), 0);
    }

    #[tokio::test]
    async fn history_snapshot_is_idempotent() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut store = rewards_store(kv).await;
        store
            .credit(500, "Gift card", EntryMethod::Credit)
            .await
            .unwrap();

        assert_eq!(store.history_snapshot(), store.history_snapshot());
    }

    #[tokio::test]
    async fn reload_round_trips_balance_and_history() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let mut store = rewards_store(kv.clone()).await;
        store
            .credit(2_000, "Promo credit", EntryMethod::Credit)
            .await
            .unwrap();
        store
            .debit(750, "Soundtrack", EntryMethod::Debit)
            .await
            .unwrap();

        let reloaded = rewards_store(kv).await;
        assert_eq!(reloaded.balance(), store.balance());
        assert_eq!(reloaded.history_snapshot(), store.history_snapshot());
    }

    #[tokio::test]
    async fn corrupt_persisted_state_falls_back_to_defaults() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set("balance:rewards:user-1", "not-a-number")
            .await
            .unwrap();
        kv.set("history:rewards:user-1", "{broken json")
            .await
            .unwrap();

        let store = rewards_store(kv).await;
        assert_eq!(store.balance(), Resource::Rewards.seed_balance());
        assert!(store.history_snapshot().is_empty());
    }

    #[tokio::test]
    async fn exclusive_mark_rejects_overlap_and_releases_on_drop() {
        let kv = Arc::new(MemoryKvStore::new());
        let store = rewards_store(kv).await;

        let mark = store.begin_exclusive().unwrap();
        assert!(store.is_in_flight());
        assert!(matches!(
            store.begin_exclusive(),
            Err(LedgerError::OperationInFlight)
        ));

        drop(mark);
        assert!(!store.is_in_flight());
        store.begin_exclusive().unwrap();
    }
}
