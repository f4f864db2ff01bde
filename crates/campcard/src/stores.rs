//! Ephemeral stores (Redis).
//!
//! This module contains traits and implementations for the short-lived code
//! records. Everything stored here expires through its TTL; nothing is ever
//! deleted explicitly.
//!
//! ## Stores
//!
//! - **user_codes** - Scout referral codes (30 day TTL) plus a code → user index
//! - **offer_links** - Offer link records with usage counters (90 day TTL)
//! - **memory** - In-process implementation of both, for local runs and tests
//!
//! ## Redis Key Patterns
//!
//! ```text
//! qr:user:{user_id}     → code string (auto-expires)
//! qr:code:{code}        → user_id, written in the same MULTI as qr:user
//! link:offer:{code}     → OfferLink JSON (auto-expires, TTL re-set on redeem)
//! ```

mod memory;
mod offer_links;
mod user_codes;

pub use memory::MemoryStore;
pub use offer_links::{OfferLinkStore, Redemption, RedisOfferLinkStore};
pub use user_codes::{RedisUserCodeStore, UserCodeStore};

#[cfg(test)]
pub use offer_links::MockOfferLinkStore;
#[cfg(test)]
pub use user_codes::MockUserCodeStore;

use std::sync::Arc;

/// Collection of all ephemeral stores.
#[derive(Clone)]
pub struct Stores {
    pub user_codes: Arc<dyn UserCodeStore>,
    pub offer_links: Arc<dyn OfferLinkStore>,
}

impl Stores {
    /// Stores backed by a shared Redis client.
    pub fn redis(client: redis::Client) -> Self {
        Self {
            user_codes: Arc::new(RedisUserCodeStore::new(client.clone())),
            offer_links: Arc::new(RedisOfferLinkStore::new(client)),
        }
    }

    /// Stores backed by a single in-process map.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            user_codes: store.clone(),
            offer_links: store,
        }
    }
}
