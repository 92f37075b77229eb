//! Closed catalog of redemption codes.
//!
//! Lookups run against normalized codes only. Known-bad codes carry their own
//! rejection reason so the validator can show the user why a real-looking
//! card was refused, distinct from a plain unknown code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::LedgerError;

/// What a valid code grants when redeemed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGrant {
    pub description: String,
    pub value: u64,
    pub category: String,
}

impl CodeGrant {
    pub fn new(description: impl Into<String>, value: u64, category: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            value,
            category: category.into(),
        }
    }
}

/// Why a known code is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeRejection {
    AlreadyRedeemed,
    Expired,
    RegionRestricted,
}

impl CodeRejection {
    fn into_error(self) -> LedgerError {
        match self {
            Self::AlreadyRedeemed => LedgerError::AlreadyRedeemed,
            Self::Expired => LedgerError::Expired,
            Self::RegionRestricted => LedgerError::RegionRestricted,
        }
    }
}

/// Static mapping of normalized codes to grants and known rejections.
#[derive(Debug, Clone, Default)]
pub struct CodeCatalog {
    grants: HashMap<String, CodeGrant>,
    rejections: HashMap<String, CodeRejection>,
}

impl CodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The storefront's shipped catalog.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.add_grant(
            "WELCOME2025",
            CodeGrant::new("Welcome bonus gift card", 1_000, "gift_card"),
        );
        catalog.add_grant(
            "VIPGOLD2500",
            CodeGrant::new("VIP gold tier gift card", 2_500, "gift_card"),
        );
        catalog.add_grant(
            "SUMMERSALE500",
            CodeGrant::new("Summer sale promo credit", 500, "promo"),
        );
        catalog.add_rejection("EXPIREDCARD1", CodeRejection::Expired);
        catalog.add_rejection("USEDCARD2024", CodeRejection::AlreadyRedeemed);
        catalog.add_rejection("REGIONLOCKED", CodeRejection::RegionRestricted);
        catalog
    }

    pub fn add_grant(&mut self, code: impl Into<String>, grant: CodeGrant) {
        self.grants.insert(code.into(), grant);
    }

    pub fn add_rejection(&mut self, code: impl Into<String>, rejection: CodeRejection) {
        self.rejections.insert(code.into(), rejection);
    }

    /// Resolve a normalized code to its grant, or the reason it is refused.
    pub fn lookup(&self, code: &str) -> Result<&CodeGrant, LedgerError> {
        if let Some(rejection) = self.rejections.get(code) {
            return Err(rejection.into_error());
        }
        self.grants.get(code).ok_or(LedgerError::UnknownCode)
    }
}
