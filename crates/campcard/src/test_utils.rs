//! Shared test utilities.
//!
//! Provides a `TestStateBuilder` for constructing `AppState` instances with
//! only the mocks each test needs. Stores default to a fresh in-memory store
//! rather than a mock, since most tests want real TTL and counter behavior.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::test_utils::TestStateBuilder;
//!
//! let mut users = MockUserDirectory::new();
//! users.expect_display_name().returning(|_| Ok(Some("Ada Lovelace".into())));
//!
//! let state = TestStateBuilder::new().with_user_directory(users).build();
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Account, NewAccount, OfferLink, Subscription};
use crate::repos::{AccountLedger, MockAccountLedger, MockUserDirectory, Repos, UserDirectory};
use crate::services::{MockPaymentVerifier, PaymentVerifier};
use crate::state::AppState;
use crate::stores::{OfferLinkStore, Stores, UserCodeStore};

/// Creates a test configuration with dummy values.
pub fn test_config() -> Config {
    Config {
        database_url: "postgres://test".to_string(),
        redis_url: None,
        base_url: "https://campcard.test".to_string(),
        payment_api_url: "https://gateway.test".to_string(),
        payment_api_key: "test".to_string(),
        env: "test".to_string(),
        sentry_dsn: None,
    }
}

/// Creates an offer link with the given quota and usage.
pub fn mock_offer_link(code: &str, max_uses: u32, current_uses: u32) -> OfferLink {
    let now = Utc::now();
    OfferLink {
        code: code.to_string(),
        offer_id: Uuid::new_v4(),
        issuing_user_id: Uuid::new_v4(),
        created_at: now,
        expires_at: now + Duration::days(90),
        max_uses,
        current_uses,
    }
}

/// Creates the rows the ledger returns for a freshly inserted account.
pub fn mock_created_account(new: &NewAccount, transaction_ref: &str) -> (Account, Subscription) {
    let account = Account {
        id: Uuid::new_v4(),
        email: new.email.clone(),
        first_name: new.first_name.clone(),
        last_name: new.last_name.clone(),
        card_number: new.card_number.to_string(),
        created_at: Utc::now(),
    };
    let subscription = Subscription {
        id: Uuid::new_v4(),
        account_id: account.id,
        transaction_ref: transaction_ref.to_string(),
        status: "active".to_string(),
        referred_by: None,
        created_at: Utc::now(),
    };
    (account, subscription)
}

/// Builder for constructing test `AppState` with custom mocks.
///
/// Uses default (empty) mocks for any repo or service not explicitly set, and
/// an in-memory store for any store not explicitly set.
pub struct TestStateBuilder {
    account_ledger: Option<MockAccountLedger>,
    user_directory: Option<MockUserDirectory>,
    payment_verifier: Option<MockPaymentVerifier>,
    user_code_store: Option<Arc<dyn UserCodeStore>>,
    offer_link_store: Option<Arc<dyn OfferLinkStore>>,
}

impl TestStateBuilder {
    /// Creates a new builder with no mocks configured.
    pub fn new() -> Self {
        Self {
            account_ledger: None,
            user_directory: None,
            payment_verifier: None,
            user_code_store: None,
            offer_link_store: None,
        }
    }

    pub fn with_account_ledger(mut self, ledger: MockAccountLedger) -> Self {
        self.account_ledger = Some(ledger);
        self
    }

    pub fn with_user_directory(mut self, users: MockUserDirectory) -> Self {
        self.user_directory = Some(users);
        self
    }

    pub fn with_payment_verifier(mut self, verifier: MockPaymentVerifier) -> Self {
        self.payment_verifier = Some(verifier);
        self
    }

    pub fn with_user_code_store(mut self, store: impl UserCodeStore + 'static) -> Self {
        self.user_code_store = Some(Arc::new(store));
        self
    }

    pub fn with_offer_link_store(mut self, store: impl OfferLinkStore + 'static) -> Self {
        self.offer_link_store = Some(Arc::new(store));
        self
    }

    /// Builds the `AppState` using configured mocks or defaults.
    pub fn build(self) -> AppState {
        let repos = Repos {
            accounts: Arc::new(self.account_ledger.unwrap_or_else(MockAccountLedger::new))
                as Arc<dyn AccountLedger>,
            users: Arc::new(self.user_directory.unwrap_or_else(MockUserDirectory::new))
                as Arc<dyn UserDirectory>,
        };

        let memory = Stores::memory();
        let stores = Stores {
            user_codes: self.user_code_store.unwrap_or(memory.user_codes),
            offer_links: self.offer_link_store.unwrap_or(memory.offer_links),
        };

        let payments = Arc::new(self.payment_verifier.unwrap_or_else(MockPaymentVerifier::new))
            as Arc<dyn PaymentVerifier>;

        AppState {
            config: test_config(),
            repos,
            stores,
            payments,
        }
    }
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
