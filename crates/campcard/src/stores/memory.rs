//! In-process ephemeral store.
//!
//! Mirrors the Redis key layout and TTL semantics with a mutex-guarded map.
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can move time
//! forward with `tokio::time::advance`.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    offer_links::{OfferLinkStore, Redemption, link_key},
    user_codes::{USER_KEY_PREFIX, UserCodeStore, code_key, user_key},
};
use crate::models::OfferLink;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Memory implementation of UserCodeStore and OfferLinkStore.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get_live(entries: &mut HashMap<String, Entry>, key: &str) -> Option<String> {
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set_ex(entries: &mut HashMap<String, Entry>, key: String, value: String, ttl_secs: u64) {
        let now = Instant::now();
        Self::prune(entries, now);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
    }

    /// Drop every expired entry, including keys nobody reads again.
    fn prune(entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, entry| entry.is_live(now));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

#[async_trait]
impl UserCodeStore for MemoryStore {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn get_code(&self, user_id: Uuid) -> Result<Option<String>> {
        let mut entries = self.lock();
        Ok(Self::get_live(&mut entries, &user_key(user_id)))
    }

    async fn put_code(&self, user_id: Uuid, code: &str, ttl_secs: u64) -> Result<()> {
        let mut entries = self.lock();
        Self::set_ex(&mut entries, user_key(user_id), code.to_string(), ttl_secs);
        Self::set_ex(&mut entries, code_key(code), user_id.to_string(), ttl_secs);
        Ok(())
    }

    async fn code_ttl(&self, user_id: Uuid) -> Result<Option<u64>> {
        let now = Instant::now();
        let entries = self.lock();
        Ok(entries
            .get(&user_key(user_id))
            .filter(|entry| entry.is_live(now))
            .map(|entry| (entry.expires_at - now).as_secs()))
    }

    async fn find_user_by_code(&self, code: &str) -> Result<Option<Uuid>> {
        let mut entries = self.lock();
        match Self::get_live(&mut entries, &code_key(code)) {
            Some(id) => Ok(Some(id.parse()?)),
            None => Ok(None),
        }
    }

    async fn scan_codes(&self) -> Result<Vec<(Uuid, String)>> {
        let mut entries = self.lock();
        Self::prune(&mut entries, Instant::now());
        Ok(entries
            .iter()
            .filter_map(|(key, entry)| {
                let user_id = key.strip_prefix(USER_KEY_PREFIX)?.parse().ok()?;
                Some((user_id, entry.value.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl OfferLinkStore for MemoryStore {
    async fn put(&self, link: &OfferLink, ttl_secs: u64) -> Result<()> {
        let json = serde_json::to_string(link)?;
        let mut entries = self.lock();
        Self::set_ex(&mut entries, link_key(&link.code), json, ttl_secs);
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<OfferLink>> {
        let mut entries = self.lock();
        match Self::get_live(&mut entries, &link_key(code)) {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn test_and_increment(&self, code: &str, ttl_secs: u64) -> Result<Redemption> {
        let key = link_key(code);
        let mut entries = self.lock();

        let Some(json) = Self::get_live(&mut entries, &key) else {
            return Ok(Redemption::Missing);
        };
        let mut link: OfferLink = serde_json::from_str(&json)?;
        if link.is_exhausted() {
            return Ok(Redemption::AtCapacity(link));
        }

        link.current_uses += 1;
        link.expires_at = Utc::now() + chrono::Duration::seconds(i64::try_from(ttl_secs)?);
        Self::set_ex(&mut entries, key, serde_json::to_string(&link)?, ttl_secs);
        Ok(Redemption::Redeemed(link))
    }
}
