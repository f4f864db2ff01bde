//! Offer link storage for Redis.

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use redis::AsyncCommands;

use crate::models::OfferLink;

pub(super) fn link_key(code: &str) -> String {
    format!("link:offer:{}", code)
}

/// Checks the usage bound and bumps the counter in one server-side step.
/// A successful redemption restarts the TTL (ARGV[1] seconds) and records the
/// matching expiry (ARGV[2]) in the stored JSON.
static REDEEM_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return false
end
local link = cjson.decode(raw)
if link.current_uses >= link.max_uses then
    return {0, raw}
end
link.current_uses = link.current_uses + 1
link.expires_at = ARGV[2]
local updated = cjson.encode(link)
redis.call('SET', KEYS[1], updated, 'EX', ARGV[1])
return {1, updated}
"#,
    )
});

/// Outcome of an atomic test-and-increment on an offer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// Counter was below the bound and has been incremented.
    Redeemed(OfferLink),
    /// Counter already equals the bound; the record was not touched.
    AtCapacity(OfferLink),
    /// No live record under this code.
    Missing,
}

/// Store for offer link operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OfferLinkStore: Send + Sync {
    /// Store a link under its code with TTL (overwrites).
    async fn put(&self, link: &OfferLink, ttl_secs: u64) -> Result<()>;

    /// Get a link by code.
    async fn get(&self, code: &str) -> Result<Option<OfferLink>>;

    /// Atomically check the usage bound and increment the counter.
    ///
    /// A successful increment re-sets the key's TTL to `ttl_secs`; a rejected
    /// one leaves the record and its TTL untouched.
    async fn test_and_increment(&self, code: &str, ttl_secs: u64) -> Result<Redemption>;
}

/// Redis implementation of OfferLinkStore.
#[derive(Clone)]
pub struct RedisOfferLinkStore {
    client: redis::Client,
}

impl RedisOfferLinkStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OfferLinkStore for RedisOfferLinkStore {
    async fn put(&self, link: &OfferLink, ttl_secs: u64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(link)?;

        let _: () = conn.set_ex(link_key(&link.code), json, ttl_secs).await?;
        Ok(())
    }

    async fn get(&self, code: &str) -> Result<Option<OfferLink>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let json: Option<String> = conn.get(link_key(code)).await?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    async fn test_and_increment(&self, code: &str, ttl_secs: u64) -> Result<Redemption> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let expires_at = Utc::now() + Duration::seconds(i64::try_from(ttl_secs)?);

        let reply: Option<(i64, String)> = REDEEM_SCRIPT
            .key(link_key(code))
            .arg(ttl_secs)
            .arg(expires_at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .invoke_async(&mut conn)
            .await?;

        match reply {
            None => Ok(Redemption::Missing),
            Some((1, json)) => Ok(Redemption::Redeemed(serde_json::from_str(&json)?)),
            Some((_, json)) => Ok(Redemption::AtCapacity(serde_json::from_str(&json)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    /// Needs a Redis server: `CAMPCARD_TEST_REDIS_URL` or the local default.
    fn redis_store() -> RedisOfferLinkStore {
        let url = std::env::var("CAMPCARD_TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        RedisOfferLinkStore::new(redis::Client::open(url).unwrap())
    }

    fn link(max_uses: u32) -> OfferLink {
        let now = Utc::now();
        OfferLink {
            code: format!("TEST{}", Uuid::new_v4().simple()),
            offer_id: Uuid::new_v4(),
            issuing_user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::seconds(60),
            max_uses,
            current_uses: 0,
        }
    }

    #[test]
    fn link_key_uses_offer_prefix() {
        assert_eq!(link_key("ABCDEFGHIJKL"), "link:offer:ABCDEFGHIJKL");
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn redeem_script_counts_to_bound_and_round_trips() {
        let store = redis_store();
        let link = link(2);
        store.put(&link, 60).await.unwrap();

        let Redemption::Redeemed(first) = store.test_and_increment(&link.code, 120).await.unwrap()
        else {
            panic!("first redemption rejected");
        };
        assert_eq!(first.current_uses, 1);
        assert_eq!(first.offer_id, link.offer_id);
        assert_eq!(first.issuing_user_id, link.issuing_user_id);
        assert_eq!(first.created_at, link.created_at);
        assert!(first.expires_at > link.expires_at);

        assert!(matches!(
            store.test_and_increment(&link.code, 120).await.unwrap(),
            Redemption::Redeemed(l) if l.current_uses == 2
        ));
        assert!(matches!(
            store.test_and_increment(&link.code, 120).await.unwrap(),
            Redemption::AtCapacity(l) if l.current_uses == 2
        ));
        assert_eq!(store.get(&link.code).await.unwrap().unwrap().current_uses, 2);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn redeem_script_resets_ttl() {
        let store = redis_store();
        let link = link(5);
        store.put(&link, 60).await.unwrap();

        store.test_and_increment(&link.code, 600).await.unwrap();

        let mut conn = store.client.get_multiplexed_async_connection().await.unwrap();
        let ttl: i64 = conn.ttl(link_key(&link.code)).await.unwrap();
        assert!(ttl > 60, "ttl was {}", ttl);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn redeem_script_missing_key() {
        let store = redis_store();

        assert_eq!(
            store.test_and_increment("NOSUCHLINK00", 60).await.unwrap(),
            Redemption::Missing
        );
    }
}
