//! Database repositories (PostgreSQL).
//!
//! Each repository is abstracted behind a trait to enable mocking in tests.
//!
//! ## Repositories
//!
//! - **accounts** - Account ledger: card number and email uniqueness, account creation
//! - **users** - User directory: display names for scouts sharing codes

mod accounts;
mod users;

pub use accounts::{AccountLedger, CreateAccountOutcome, PgAccountLedger};
pub use users::{PgUserDirectory, UserDirectory};

#[cfg(test)]
pub use accounts::MockAccountLedger;
#[cfg(test)]
pub use users::MockUserDirectory;

use std::sync::Arc;

/// Collection of all database repositories.
#[derive(Clone)]
pub struct Repos {
    pub accounts: Arc<dyn AccountLedger>,
    pub users: Arc<dyn UserDirectory>,
}
