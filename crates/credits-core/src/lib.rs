//! Client-side value ledger for the storefront.
//!
//! Owns per-user wallet and rewards balances with their append-only
//! histories, mutated only through guarded operations: sufficient-funds
//! checks, atomic balance+history updates, and simulated asynchronous
//! settlement for claims and code redemptions. Persistence is a best-effort
//! write-through cache; in-memory state stays authoritative for the session.

#![deny(unsafe_code)]

pub mod catalog;
pub mod claim;
pub mod error;
pub mod identity;
pub mod kv;
pub mod redeem;
pub mod settlement;
pub mod store;
pub mod types;
pub mod view;

pub use catalog::{CodeCatalog, CodeGrant, CodeRejection};
pub use claim::{ClaimOperation, OperationPhase, PhaseSignal};
pub use error::LedgerError;
pub use identity::IdentityProvider;
pub use kv::{balance_key, history_key, KeyValueStore, MemoryKvStore};
pub use redeem::{normalize_code, CodeValidator};
pub use settlement::{FixedDelaySettlement, Settlement};
pub use store::{ExclusiveMark, LedgerStore};
pub use types::{
    EntryMethod, EntryStatus, HistoryEntry, RedeemResult, Resource, UserProfile,
};
pub use view::LedgerHandle;
