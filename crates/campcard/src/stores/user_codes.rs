//! Scout referral code storage for Redis.

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

pub(super) const USER_KEY_PREFIX: &str = "qr:user:";
pub(super) const CODE_KEY_PREFIX: &str = "qr:code:";

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 500;

pub(super) fn user_key(user_id: Uuid) -> String {
    format!("{}{}", USER_KEY_PREFIX, user_id)
}

pub(super) fn code_key(code: &str) -> String {
    format!("{}{}", CODE_KEY_PREFIX, code)
}

/// Store for per-user referral codes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserCodeStore: Send + Sync {
    /// Health check - verify store connectivity.
    async fn health_check(&self) -> Result<bool>;

    /// Get the live code for a user.
    async fn get_code(&self, user_id: Uuid) -> Result<Option<String>>;

    /// Store a user's code and its reverse index entry with TTL (overwrites).
    async fn put_code(&self, user_id: Uuid, code: &str, ttl_secs: u64) -> Result<()>;

    /// Remaining lifetime of a user's code in seconds.
    async fn code_ttl(&self, user_id: Uuid) -> Result<Option<u64>>;

    /// Resolve a code through the reverse index.
    async fn find_user_by_code(&self, code: &str) -> Result<Option<Uuid>>;

    /// Walk every live `qr:user:*` key. Linear in the number of live codes.
    async fn scan_codes(&self) -> Result<Vec<(Uuid, String)>>;
}

/// Redis implementation of UserCodeStore.
#[derive(Clone)]
pub struct RedisUserCodeStore {
    client: redis::Client,
}

impl RedisUserCodeStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserCodeStore for RedisUserCodeStore {
    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(result == "PONG")
    }

    async fn get_code(&self, user_id: Uuid) -> Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let code: Option<String> = conn.get(user_key(user_id)).await?;
        Ok(code)
    }

    async fn put_code(&self, user_id: Uuid, code: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .set_ex(user_key(user_id), code, ttl_secs)
            .ignore()
            .set_ex(code_key(code), user_id.to_string(), ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn code_ttl(&self, user_id: Uuid) -> Result<Option<u64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // -2: no such key, -1: key without expiry
        let ttl: i64 = conn.ttl(user_key(user_id)).await?;
        Ok(u64::try_from(ttl).ok())
    }

    async fn find_user_by_code(&self, code: &str) -> Result<Option<Uuid>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let user_id: Option<String> = conn.get(code_key(code)).await?;
        match user_id {
            Some(id) => Ok(Some(id.parse()?)),
            None => Ok(None),
        }
    }

    async fn scan_codes(&self) -> Result<Vec<(Uuid, String)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{}*", USER_KEY_PREFIX);

        let mut found = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let codes: Vec<Option<String>> =
                    redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

                for (key, code) in keys.iter().zip(codes) {
                    // Keys can expire between SCAN and MGET
                    let Some(code) = code else { continue };
                    let Ok(user_id) = key[USER_KEY_PREFIX.len()..].parse::<Uuid>() else {
                        tracing::warn!(key = %key, "skipping user code key with malformed id");
                        continue;
                    };
                    found.push((user_id, code));
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(found)
    }
}
