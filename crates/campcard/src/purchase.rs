//! Subscription purchase.
//!
//! Flow:
//! 1. Validate the request
//! 2. Verify the transaction reference with the payment gateway (`payment-pending`)
//! 3. Reject emails already in the ledger (`payment-verified`)
//! 4. Allocate a card number and insert account + subscription in one transaction
//!    (`account-created` → `subscription-active`)
//! 5. Mint the new account's own referral code
//!
//! Nothing is written before steps 2 and 3 pass, and the account and its
//! subscription commit together, so a failed purchase leaves no partial
//! account. Callers always get a `PurchaseOutcome`, never an `Err`: failures
//! carry a machine-readable code and internal details stay in the logs.

use std::sync::Arc;

use garde::Validate;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::CodeError,
    issuance::{CardAllocator, UserCodeIssuer},
    models::{Account, CardNumber, NewAccount, PurchaseRequest, Subscription, UserCode},
    repos::{AccountLedger, CreateAccountOutcome},
    services::{PaymentOutcome, PaymentVerifier},
};

/// Inserts retried when a freshly allocated card number loses a race.
const CARD_INSERT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurchaseStage {
    PaymentPending,
    PaymentVerified,
    AccountCreated,
    SubscriptionActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseErrorCode {
    InvalidRequest,
    VerificationFailed,
    EmailConflict,
    InternalError,
}

impl PurchaseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseErrorCode::InvalidRequest => "invalid_request",
            PurchaseErrorCode::VerificationFailed => "verification_failed",
            PurchaseErrorCode::EmailConflict => "email_conflict",
            PurchaseErrorCode::InternalError => "internal_error",
        }
    }
}

impl From<&CodeError> for PurchaseErrorCode {
    fn from(err: &CodeError) -> Self {
        match err {
            CodeError::Validation(_) => PurchaseErrorCode::InvalidRequest,
            CodeError::VerificationFailed(_) => PurchaseErrorCode::VerificationFailed,
            CodeError::Conflict(_) => PurchaseErrorCode::EmailConflict,
            _ => PurchaseErrorCode::InternalError,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub account: Account,
    pub subscription: Subscription,
    pub card_number: CardNumber,
    /// Absent if minting failed after the account committed.
    pub referral_code: Option<UserCode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Completed(PurchaseReceipt),
    Failed {
        /// Last stage reached before the failure.
        stage: PurchaseStage,
        code: PurchaseErrorCode,
        message: String,
    },
}

pub struct PurchaseFlow {
    ledger: Arc<dyn AccountLedger>,
    payments: Arc<dyn PaymentVerifier>,
    cards: CardAllocator,
    user_codes: UserCodeIssuer,
}

impl PurchaseFlow {
    pub fn new(
        ledger: Arc<dyn AccountLedger>,
        payments: Arc<dyn PaymentVerifier>,
        cards: CardAllocator,
        user_codes: UserCodeIssuer,
    ) -> Self {
        Self {
            ledger,
            payments,
            cards,
            user_codes,
        }
    }

    /// Run the purchase to completion or to its first failure.
    pub async fn run(&self, request: &PurchaseRequest) -> PurchaseOutcome {
        let mut stage = PurchaseStage::PaymentPending;

        match self.execute(request, &mut stage).await {
            Ok(receipt) => PurchaseOutcome::Completed(receipt),
            Err(err) => {
                let code = PurchaseErrorCode::from(&err);
                let message = match &err {
                    CodeError::Internal(e) => {
                        tracing::error!(stage = ?stage, "purchase failed: {:?}", e);
                        sentry::capture_error(
                            e.as_ref() as &(dyn std::error::Error + Send + Sync + 'static)
                        );
                        "Internal error".to_string()
                    }
                    other => {
                        tracing::warn!(stage = ?stage, code = code.as_str(), "purchase rejected: {}", other);
                        other.to_string()
                    }
                };

                PurchaseOutcome::Failed {
                    stage,
                    code,
                    message,
                }
            }
        }
    }

    async fn execute(
        &self,
        request: &PurchaseRequest,
        stage: &mut PurchaseStage,
    ) -> Result<PurchaseReceipt, CodeError> {
        request
            .validate()
            .map_err(|e| CodeError::Validation(e.to_string()))?;
        let email = request.email.trim().to_ascii_lowercase();

        if let PaymentOutcome::Declined { reason } =
            self.payments.verify(&request.transaction_ref).await?
        {
            return Err(CodeError::VerificationFailed(reason));
        }
        advance(stage, PurchaseStage::PaymentVerified, &request.transaction_ref);

        if self.ledger.email_exists(&email).await? {
            return Err(CodeError::Conflict("email"));
        }

        let referred_by = self.resolve_referrer(request.scout_code.as_deref()).await;

        let mut created = None;
        for _ in 0..CARD_INSERT_ATTEMPTS {
            let new_account = NewAccount {
                email: email.clone(),
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                card_number: self.cards.allocate().await?,
            };

            match self
                .ledger
                .create_with_subscription(&new_account, &request.transaction_ref, referred_by)
                .await?
            {
                CreateAccountOutcome::Created {
                    account,
                    subscription,
                } => {
                    created = Some((account, subscription, new_account.card_number));
                    break;
                }
                CreateAccountOutcome::EmailTaken => return Err(CodeError::Conflict("email")),
                CreateAccountOutcome::CardNumberTaken => {
                    tracing::warn!(card_number = %new_account.card_number, "card number taken at insert, reallocating");
                }
            }
        }
        let Some((account, subscription, card_number)) = created else {
            return Err(anyhow::anyhow!(
                "card number collided at insert {} times",
                CARD_INSERT_ATTEMPTS
            )
            .into());
        };
        advance(stage, PurchaseStage::AccountCreated, &request.transaction_ref);
        advance(stage, PurchaseStage::SubscriptionActive, &request.transaction_ref);

        let referral_code = match self.user_codes.issue(account.id).await {
            Ok(code) => Some(code),
            Err(e) => {
                tracing::warn!(account_id = %account.id, "referral code not minted: {:?}", e);
                None
            }
        };

        tracing::info!(
            account_id = %account.id,
            card_number = %card_number,
            referred_by = ?referred_by,
            "subscription purchased"
        );

        Ok(PurchaseReceipt {
            account,
            subscription,
            card_number,
            referral_code,
        })
    }

    /// Scout credited with the sale. Unknown or expired codes just mean no credit.
    async fn resolve_referrer(&self, scout_code: Option<&str>) -> Option<Uuid> {
        let code = scout_code.filter(|c| !c.trim().is_empty())?;

        match self.user_codes.reverse_lookup(code).await {
            Ok(user_code) => Some(user_code.user_id),
            Err(CodeError::NotFound(_)) => {
                tracing::warn!(scout_code = %code, "referral code not found, no credit given");
                None
            }
            Err(e) => {
                tracing::warn!(scout_code = %code, "referral lookup failed: {:?}", e);
                None
            }
        }
    }
}

fn advance(stage: &mut PurchaseStage, next: PurchaseStage, transaction_ref: &str) {
    tracing::debug!(from = ?*stage, to = ?next, transaction_ref = %transaction_ref, "purchase stage");
    *stage = next;
}
