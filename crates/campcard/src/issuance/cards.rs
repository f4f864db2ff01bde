//! Card number allocation.
//!
//! Candidates are random 12-digit values checked against the account ledger.
//! After `MAX_ALLOCATION_ATTEMPTS` collisions the allocator stops asking the
//! ledger and derives digits from a UUIDv4 instead. That fallback is returned
//! unchecked: callers get a ledger-checked number only up to the attempt limit,
//! and the ledger's unique constraint is the final guard.

use std::sync::Arc;

use uuid::Uuid;

use crate::{codegen, error::CodeError, models::CardNumber, repos::AccountLedger};

/// Ledger checks before switching to the UUID fallback.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 10;

pub struct CardAllocator {
    ledger: Arc<dyn AccountLedger>,
}

impl CardAllocator {
    pub fn new(ledger: Arc<dyn AccountLedger>) -> Self {
        Self { ledger }
    }

    /// Allocate a card number not currently held in the ledger.
    pub async fn allocate(&self) -> Result<CardNumber, CodeError> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let candidate = CardNumber::from_digits(&codegen::new_digits(CardNumber::DIGITS))
                .ok_or_else(|| anyhow::anyhow!("generated card digits were malformed"))?;

            if !self.ledger.card_number_exists(&candidate).await? {
                tracing::debug!(attempt, card_number = %candidate, "card number allocated");
                return Ok(candidate);
            }

            tracing::debug!(attempt, card_number = %candidate, "card number taken, retrying");
        }

        let fallback = fallback_card_number(Uuid::new_v4())
            .ok_or_else(|| anyhow::anyhow!("fallback card digits were malformed"))?;
        tracing::warn!(
            attempts = MAX_ALLOCATION_ATTEMPTS,
            card_number = %fallback,
            "card number retries exhausted, using unchecked fallback"
        );
        Ok(fallback)
    }
}

/// Map the first twelve hex nibbles of a UUID onto decimal digits.
fn fallback_card_number(id: Uuid) -> Option<CardNumber> {
    let digits: String = id
        .simple()
        .to_string()
        .chars()
        .take(CardNumber::DIGITS)
        .map(|c| {
            let nibble = c.to_digit(16).unwrap_or(0);
            char::from(b'0' + (nibble % 10) as u8)
        })
        .collect();

    CardNumber::from_digits(&digits)
}
