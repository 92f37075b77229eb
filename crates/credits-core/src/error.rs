use thiserror::Error;

/// Value-ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("No authenticated user for this operation")]
    NotAuthenticated,

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Amount must be positive (got {0})")]
    InvalidAmount(u64),

    #[error("Code is not in a recognizable format")]
    InvalidFormat,

    #[error("Code is not recognized")]
    UnknownCode,

    #[error("Code has already been redeemed")]
    AlreadyRedeemed,

    #[error("Code has expired")]
    Expired,

    #[error("Code is not valid in this region")]
    RegionRestricted,

    #[error("Too many redemption attempts, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Settlement did not confirm within {timeout_ms} ms")]
    SettlementTimeout { timeout_ms: u64 },

    #[error("Another operation is already in flight for this ledger")]
    OperationInFlight,

    #[error("Persistent storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Settlement failed: {0}")]
    SettlementFailed(String),
}

impl LedgerError {
    pub fn insufficient(needed: u64, available: u64) -> Self {
        Self::InsufficientBalance { needed, available }
    }
}
