use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger resources owned per user.
///
/// Each resource carries its own balance, history, and storage namespace, so
/// wallet funds and reward points never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Wallet,
    Rewards,
}

impl Resource {
    /// Storage label used when namespacing persistent keys.
    pub fn label(self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Rewards => "rewards",
        }
    }

    /// Balance seeded on first access for a user with no persisted state.
    pub fn seed_balance(self) -> u64 {
        match self {
            Self::Wallet => 0,
            Self::Rewards => 12_500,
        }
    }
}

/// How a balance change was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMethod {
    Credit,
    Debit,
    Claim,
}

impl EntryMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Claim => "claim",
        }
    }
}

/// Lifecycle status of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Completed,
    Pending,
    Failed,
}

/// One immutable record of a completed balance change.
///
/// Entries are never edited after creation. The history they form is
/// append-only and read back most recent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entry_id: String,
    pub description: String,
    /// Signed delta in minor units / points. Positive for credit.
    pub delta: i64,
    pub method: EntryMethod,
    pub timestamp: DateTime<Utc>,
    pub status: EntryStatus,
}

impl HistoryEntry {
    pub fn completed(description: impl Into<String>, delta: i64, method: EntryMethod) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            description: description.into(),
            delta,
            method,
            timestamp: Utc::now(),
            status: EntryStatus::Completed,
        }
    }
}

/// Authenticated user profile consumed from the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl UserProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Outcome of a successful redemption-code submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedeemResult {
    pub code: String,
    pub description: String,
    pub value: u64,
    pub category: String,
    pub redeemed_at: DateTime<Utc>,
}
