use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Length of every generated user code and offer code.
pub const CODE_LENGTH: usize = 12;
/// User referral codes live for 30 days.
pub const USER_CODE_TTL_SECS: u64 = 30 * 24 * 60 * 60;
/// Offer links live for 90 days.
pub const OFFER_LINK_TTL_SECS: u64 = 90 * 24 * 60 * 60;
/// Redemption quota given to every new offer link.
pub const DEFAULT_MAX_USES: u32 = 1000;

/// A scout's referral code. Only the code string is stored; the timestamps are
/// derived from the key's TTL when read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCode {
    pub user_id: Uuid,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Shareable offer link stored as JSON under `link:offer:{code}`.
///
/// The usage counter sits next to its bound in the same record so a single
/// atomic store operation can check and bump it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferLink {
    pub code: String,
    pub offer_id: Uuid,
    pub issuing_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub current_uses: u32,
}

impl OfferLink {
    pub fn is_exhausted(&self) -> bool {
        self.current_uses >= self.max_uses
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.current_uses)
    }
}

/// Account card number in the form `CC-####-####-####`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardNumber(String);

impl CardNumber {
    pub const PREFIX: &'static str = "CC-";
    pub const DIGITS: usize = 12;

    /// Formats exactly twelve ASCII digits into card-number shape.
    pub fn from_digits(digits: &str) -> Option<Self> {
        if digits.len() != Self::DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(format!(
            "{}{}-{}-{}",
            Self::PREFIX,
            &digits[0..4],
            &digits[4..8],
            &digits[8..12]
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CardNumber {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| anyhow::anyhow!("card number must start with {}", Self::PREFIX))?;
        let groups: Vec<&str> = rest.split('-').collect();
        if groups.len() != 3 || groups.iter().any(|g| g.len() != 4) {
            anyhow::bail!("card number must have three groups of four digits");
        }
        Self::from_digits(&groups.concat())
            .ok_or_else(|| anyhow::anyhow!("card number groups must be digits"))
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub card_number: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub account_id: Uuid,
    pub transaction_ref: String,
    pub status: String,
    pub referred_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Row inserted into the ledger once payment and email checks pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub card_number: CardNumber,
}

/// Subscription purchase submitted after the buyer paid at the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseRequest {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 100))]
    pub first_name: String,
    #[garde(length(min = 1, max = 100))]
    pub last_name: String,
    /// Gateway transaction reference to verify.
    #[garde(length(min = 1, max = 128))]
    pub transaction_ref: String,
    /// Referral code of the scout who shared the subscribe link, if any.
    #[garde(skip)]
    #[serde(default)]
    pub scout_code: Option<String>,
}
