//! Account ledger for PostgreSQL.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{Account, CardNumber, NewAccount, Subscription};

/// Result of inserting an account together with its first subscription.
#[derive(Debug, Clone)]
pub enum CreateAccountOutcome {
    Created {
        account: Account,
        subscription: Subscription,
    },
    /// Another account already holds this email; nothing was written.
    EmailTaken,
    /// Another account already holds this card number; nothing was written.
    CardNumberTaken,
}

/// Repository for the durable account ledger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Check whether any account holds this card number.
    async fn card_number_exists(&self, card_number: &CardNumber) -> Result<bool>;

    /// Check whether any account holds this email.
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Insert an account and its active subscription in one transaction.
    async fn create_with_subscription(
        &self,
        account: &NewAccount,
        transaction_ref: &str,
        referred_by: Option<Uuid>,
    ) -> Result<CreateAccountOutcome>;
}

/// PostgreSQL implementation of AccountLedger.
#[derive(Clone)]
pub struct PgAccountLedger {
    pool: Pool<Postgres>,
}

impl PgAccountLedger {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Which unique constraint, if any, rejected an insert.
fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => Some(db.constraint().unwrap_or("")),
        _ => None,
    }
}

#[async_trait]
impl AccountLedger for PgAccountLedger {
    async fn card_number_exists(&self, card_number: &CardNumber) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE card_number = $1)")
                .bind(card_number.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM accounts WHERE lower(email) = lower($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_with_subscription(
        &self,
        new: &NewAccount,
        transaction_ref: &str,
        referred_by: Option<Uuid>,
    ) -> Result<CreateAccountOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (email, first_name, last_name, card_number)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, first_name, last_name, card_number, created_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.card_number.as_str())
        .fetch_one(&mut *tx)
        .await;

        let account = match inserted {
            Ok(account) => account,
            Err(err) => {
                // Dropping the transaction rolls it back
                let conflict = match unique_violation(&err) {
                    Some("accounts_email_key") => Some(CreateAccountOutcome::EmailTaken),
                    Some("accounts_card_number_key") => Some(CreateAccountOutcome::CardNumberTaken),
                    _ => None,
                };
                return conflict.ok_or_else(|| err.into());
            }
        };

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (account_id, transaction_ref, status, referred_by)
            VALUES ($1, $2, 'active', $3)
            RETURNING id, account_id, transaction_ref, status, referred_by, created_at
            "#,
        )
        .bind(account.id)
        .bind(transaction_ref)
        .bind(referred_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CreateAccountOutcome::Created {
            account,
            subscription,
        })
    }
}
