//! Gift-card / promo-code redemption.
//!
//! A narrower sibling of the claim flow: free-text code in, normalized and
//! resolved against a closed catalog, then a credit after the settlement
//! wait. Every attempt is rate limited against a fixed cooldown window to
//! blunt brute-force guessing, valid or not. No failure path touches the
//! ledger.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::catalog::CodeCatalog;
use crate::claim::{OperationPhase, PhaseSignal};
use crate::error::LedgerError;
use crate::identity::IdentityProvider;
use crate::settlement::Settlement;
use crate::store::LedgerStore;
use crate::types::{EntryMethod, RedeemResult};

const MIN_CODE_LEN: usize = 8;
const MAX_CODE_LEN: usize = 16;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
const DEFAULT_SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalize a free-text code: uppercase, separators stripped, bounded
/// alphanumeric length.
pub fn normalize_code(raw: &str) -> Result<String, LedgerError> {
    let normalized: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let well_formed = (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&normalized.len())
        && normalized.chars().all(|c| c.is_ascii_alphanumeric());
    if !well_formed {
        return Err(LedgerError::InvalidFormat);
    }
    Ok(normalized)
}

/// Redemption flow against one ledger store (the wallet, in the storefront).
pub struct CodeValidator {
    store: Arc<Mutex<LedgerStore>>,
    identity: Arc<dyn IdentityProvider>,
    settlement: Arc<dyn Settlement>,
    catalog: CodeCatalog,
    cooldown: Duration,
    settlement_timeout: Duration,
    last_attempt: Mutex<Option<Instant>>,
    phase: PhaseSignal,
}

impl CodeValidator {
    pub fn new(
        store: Arc<Mutex<LedgerStore>>,
        identity: Arc<dyn IdentityProvider>,
        settlement: Arc<dyn Settlement>,
        catalog: CodeCatalog,
    ) -> Self {
        Self {
            store,
            identity,
            settlement,
            catalog,
            cooldown: DEFAULT_COOLDOWN,
            settlement_timeout: DEFAULT_SETTLEMENT_TIMEOUT,
            last_attempt: Mutex::new(None),
            phase: PhaseSignal::new(),
        }
    }

    /// Current phase of the most recent redemption.
    pub fn phase(&self) -> OperationPhase {
        self.phase.current()
    }

    /// Watch phase transitions, e.g. to disable the redeem button while a
    /// submission is pending.
    pub fn watch_phase(&self) -> watch::Receiver<OperationPhase> {
        self.phase.watch()
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_settlement_timeout(mut self, timeout: Duration) -> Self {
        self.settlement_timeout = timeout;
        self
    }

    /// Redeem a code and credit its value to the ledger.
    pub async fn redeem(&self, raw_code: &str) -> Result<RedeemResult, LedgerError> {
        // Rate limit first, regardless of what the code turns out to be.
        // Every attempt restarts the window.
        {
            let mut last = self.last_attempt.lock().await;
            let now = Instant::now();
            if let Some(previous) = last.replace(now) {
                let elapsed = now.duration_since(previous);
                if elapsed < self.cooldown {
                    let retry_after = self.cooldown - elapsed;
                    return Err(LedgerError::RateLimited {
                        retry_after_ms: retry_after.as_millis() as u64,
                    });
                }
            }
        }

        let user = self
            .identity
            .current_user()
            .ok_or(LedgerError::NotAuthenticated)?;
        let code = normalize_code(raw_code)?;
        let grant = self.catalog.lookup(&code)?.clone();

        // The mark releases the ledger when dropped, whichever way this
        // future ends.
        let _mark = self.store.lock().await.begin_exclusive()?;
        self.phase.set(OperationPhase::Pending);

        let settled = match tokio::time::timeout(
            self.settlement_timeout,
            self.settlement.settle(&code, grant.value),
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
                code = %code,
                error = %err,
                "redemption settlement failed, ledger untouched"
            );
            return Err(err);
        }

        let entry = match store
            .credit(grant.value, grant.description.clone(), EntryMethod::Credit)
            .await
        {
            Ok(entry) => entry,
            Err(err) => {
                self.phase.set(OperationPhase::Failed);
                return Err(err);
            }
        };
        self.phase.set(OperationPhase::Completed);

        info!(
            user_id = %user.id,
            code = %code,
            value = grant.value,
            balance = store.balance(),
            "code redeemed"
        );

        Ok(RedeemResult {
            code,
            description: grant.description,
            value: grant.value,
            category: grant.category,
            redeemed_at: entry.timestamp,
        })
    }
}
