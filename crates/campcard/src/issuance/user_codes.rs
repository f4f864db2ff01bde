//! Scout referral codes.
//!
//! Each scout has at most one live code, stored under `qr:user:{user_id}` for
//! 30 days. Asking again before expiry returns the stored code untouched (same
//! code, same TTL). Concurrent first requests for one scout may both mint a
//! candidate; the last write wins and every caller is handed the code that
//! is actually stored, never a discarded candidate.
//!
//! Codes are shared two ways: a QR payload embedding the code, and a subscribe
//! URL carrying the code and the scout's display name.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    codegen,
    error::CodeError,
    models::{CODE_LENGTH, USER_CODE_TTL_SECS, UserCode},
    repos::UserDirectory,
    stores::UserCodeStore,
};

const REFERRAL_TYPE: &str = "scout_referral";

/// QR payload. Falls back to the bare code if the JSON form can't be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralContent {
    Encoded(String),
    Degraded(String),
}

impl ReferralContent {
    pub fn as_str(&self) -> &str {
        match self {
            ReferralContent::Encoded(s) | ReferralContent::Degraded(s) => s,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ReferralContent::Degraded(_))
    }
}

#[derive(Serialize)]
struct ReferralPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    user_id: Uuid,
    code: &'a str,
    expires_at: i64,
}

/// Everything a scout needs to share their code.
#[derive(Debug, Clone)]
pub struct ShareableCode {
    pub user_code: UserCode,
    pub payload: ReferralContent,
    pub subscribe_url: String,
}

pub struct UserCodeIssuer {
    store: Arc<dyn UserCodeStore>,
    users: Arc<dyn UserDirectory>,
    base_url: String,
}

impl UserCodeIssuer {
    pub fn new(
        store: Arc<dyn UserCodeStore>,
        users: Arc<dyn UserDirectory>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            users,
            base_url: base_url.into(),
        }
    }

    /// Return the scout's live code, minting and storing one if none exists.
    pub async fn issue(&self, user_id: Uuid) -> Result<UserCode, CodeError> {
        if let Some(code) = self.store.get_code(user_id).await? {
            // Key may expire between the two reads; report it as expiring now
            let remaining = self.store.code_ttl(user_id).await?.unwrap_or(0);
            return Ok(derive_user_code(user_id, code, remaining, Utc::now()));
        }

        let code = codegen::new_code(CODE_LENGTH);
        self.store
            .put_code(user_id, &code, USER_CODE_TTL_SECS)
            .await?;

        // Another first issuance may have overwritten ours
        if let Some(stored) = self.store.get_code(user_id).await?
            && stored != code
        {
            tracing::debug!(user_id = %user_id, "concurrent issuance won, returning stored code");
            let remaining = self.store.code_ttl(user_id).await?.unwrap_or(0);
            return Ok(derive_user_code(user_id, stored, remaining, Utc::now()));
        }

        tracing::info!(user_id = %user_id, "user code issued");

        Ok(derive_user_code(
            user_id,
            code,
            USER_CODE_TTL_SECS,
            Utc::now(),
        ))
    }

    /// Find the scout that owns `code`.
    ///
    /// Tries the `qr:code:` index first, then falls back to scanning every
    /// live user code (linear; meant for support lookups, not hot paths).
    pub async fn reverse_lookup(&self, code: &str) -> Result<UserCode, CodeError> {
        let code = code.trim().to_ascii_uppercase();

        if let Some(user_id) = self.store.find_user_by_code(&code).await? {
            // The index entry is stale if the scout was re-issued a new code
            if self.store.get_code(user_id).await?.as_deref() == Some(code.as_str()) {
                return self.issue(user_id).await;
            }
        }

        let owner = self
            .store
            .scan_codes()
            .await?
            .into_iter()
            .find(|(_, stored)| *stored == code)
            .map(|(user_id, _)| user_id);

        match owner {
            Some(user_id) => {
                tracing::debug!(user_id = %user_id, "user code resolved by scan");
                self.issue(user_id).await
            }
            None => Err(CodeError::NotFound("user code")),
        }
    }

    /// QR payload for a code.
    pub fn referral_payload(&self, user_code: &UserCode) -> ReferralContent {
        encode_referral(user_code, |payload| serde_json::to_string(payload))
    }

    /// `{base}/campcard/subscribe/?scout={code}&name={display name}`
    pub async fn subscribe_url(&self, user_code: &UserCode) -> Result<String, CodeError> {
        let name = self
            .users
            .display_name(user_code.user_id)
            .await?
            .ok_or(CodeError::NotFound("user"))?;

        let escaped: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
        Ok(format!(
            "{}/campcard/subscribe/?scout={}&name={}",
            self.base_url, user_code.code, escaped
        ))
    }

    /// Issue (or reuse) a code and build both share forms.
    pub async fn share(&self, user_id: Uuid) -> Result<ShareableCode, CodeError> {
        let user_code = self.issue(user_id).await?;
        let payload = self.referral_payload(&user_code);
        let subscribe_url = self.subscribe_url(&user_code).await?;

        Ok(ShareableCode {
            user_code,
            payload,
            subscribe_url,
        })
    }
}

fn derive_user_code(
    user_id: Uuid,
    code: String,
    remaining_secs: u64,
    now: DateTime<Utc>,
) -> UserCode {
    let remaining = remaining_secs.min(USER_CODE_TTL_SECS) as i64;
    let expires_at = now + Duration::seconds(remaining);
    UserCode {
        user_id,
        code,
        issued_at: expires_at - Duration::seconds(USER_CODE_TTL_SECS as i64),
        expires_at,
    }
}

fn encode_referral<F>(user_code: &UserCode, encode: F) -> ReferralContent
where
    F: FnOnce(&ReferralPayload<'_>) -> serde_json::Result<String>,
{
    let payload = ReferralPayload {
        kind: REFERRAL_TYPE,
        user_id: user_code.user_id,
        code: &user_code.code,
        expires_at: user_code.expires_at.timestamp(),
    };

    match encode(&payload) {
        Ok(json) => ReferralContent::Encoded(json),
        Err(e) => {
            tracing::warn!(user_id = %user_code.user_id, error = %e, "referral payload degraded to bare code");
            ReferralContent::Degraded(user_code.code.clone())
        }
    }
}
