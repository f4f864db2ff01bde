//! Offer links.
//!
//! Every call to `create_link` mints a fresh code; there is no reuse. A link
//! carries its own usage bound, and redemption goes through the store's atomic
//! test-and-increment so concurrent redeemers can never push `current_uses`
//! past `max_uses`. Each successful redemption restarts the 90-day TTL.
//! Expired and never-created links are both `NotFound`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    codegen,
    error::CodeError,
    models::{CODE_LENGTH, DEFAULT_MAX_USES, OFFER_LINK_TTL_SECS, OfferLink},
    stores::{OfferLinkStore, Redemption},
};

/// Fresh codes tried before giving up on finding an unused key.
const MINT_ATTEMPTS: usize = 3;

pub struct OfferLinkService {
    store: Arc<dyn OfferLinkStore>,
    base_url: String,
}

impl OfferLinkService {
    pub fn new(store: Arc<dyn OfferLinkStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
        }
    }

    /// Create a new link for `offer_id` shared by `issuing_user_id`.
    pub async fn create_link(
        &self,
        offer_id: Uuid,
        issuing_user_id: Uuid,
    ) -> Result<OfferLink, CodeError> {
        let code = self.mint_unused_code().await?;
        let now = Utc::now();

        let link = OfferLink {
            code,
            offer_id,
            issuing_user_id,
            created_at: now,
            expires_at: now + Duration::seconds(OFFER_LINK_TTL_SECS as i64),
            max_uses: DEFAULT_MAX_USES,
            current_uses: 0,
        };

        self.store.put(&link, OFFER_LINK_TTL_SECS).await?;

        tracing::info!(
            code = %link.code,
            offer_id = %offer_id,
            issuing_user_id = %issuing_user_id,
            "offer link created"
        );

        Ok(link)
    }

    /// Consume one use of the link and restart its expiry.
    pub async fn redeem(&self, code: &str) -> Result<OfferLink, CodeError> {
        match self
            .store
            .test_and_increment(code, OFFER_LINK_TTL_SECS)
            .await?
        {
            Redemption::Redeemed(link) => {
                tracing::info!(
                    code = %link.code,
                    offer_id = %link.offer_id,
                    current_uses = link.current_uses,
                    "offer link redeemed"
                );
                Ok(link)
            }
            Redemption::AtCapacity(link) => {
                tracing::warn!(
                    code = %link.code,
                    max_uses = link.max_uses,
                    "offer link redemption rejected: at capacity"
                );
                Err(CodeError::CapacityExceeded {
                    max_uses: link.max_uses,
                })
            }
            Redemption::Missing => Err(CodeError::NotFound("offer link")),
        }
    }

    /// Read a link without consuming a use.
    pub async fn get_link(&self, code: &str) -> Result<OfferLink, CodeError> {
        self.store
            .get(code)
            .await?
            .ok_or(CodeError::NotFound("offer link"))
    }

    /// `{base}/o/{code}`
    pub fn offer_url(&self, link: &OfferLink) -> String {
        format!("{}/o/{}", self.base_url, link.code)
    }

    async fn mint_unused_code(&self) -> Result<String, CodeError> {
        for _ in 0..MINT_ATTEMPTS {
            let code = codegen::new_code(CODE_LENGTH);
            if self.store.get(&code).await?.is_none() {
                return Ok(code);
            }
            tracing::warn!(code = %code, "offer code collision, minting another");
        }
        Err(anyhow::anyhow!("no unused offer code after {} attempts", MINT_ATTEMPTS).into())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration as StdDuration};

    use mockall::predicate::eq;

    use super::*;
    use crate::stores::{MemoryStore, MockOfferLinkStore};
    use crate::test_utils::{TestStateBuilder, mock_offer_link};

    #[tokio::test]
    async fn create_link_sets_quota_and_expiry() {
        let state = TestStateBuilder::new().build();
        let offer_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let link = state
            .offer_links()
            .create_link(offer_id, user_id)
            .await
            .unwrap();

        assert_eq!(link.code.len(), CODE_LENGTH);
        assert_eq!(link.offer_id, offer_id);
        assert_eq!(link.issuing_user_id, user_id);
        assert_eq!(link.max_uses, 1000);
        assert_eq!(link.current_uses, 0);
        assert_eq!(link.expires_at - link.created_at, Duration::days(90));
        assert_eq!(state.offer_links().get_link(&link.code).await.unwrap(), link);
    }

    #[tokio::test]
    async fn create_link_stores_with_ninety_day_ttl() {
        let mut store = MockOfferLinkStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_put()
            .withf(|link, ttl| link.current_uses == 0 && *ttl == 90 * 24 * 60 * 60)
            .times(1)
            .returning(|_, _| Ok(()));

        let state = TestStateBuilder::new().with_offer_link_store(store).build();
        state
            .offer_links()
            .create_link(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_link_is_never_idempotent() {
        let state = TestStateBuilder::new().build();
        let service = state.offer_links();
        let offer_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let codes: HashSet<String> = {
            let mut codes = HashSet::new();
            for _ in 0..5 {
                codes.insert(service.create_link(offer_id, user_id).await.unwrap().code);
            }
            codes
        };

        assert_eq!(codes.len(), 5);
    }

    #[tokio::test]
    async fn create_link_skips_colliding_code() {
        let mut store = MockOfferLinkStore::new();
        let mut seen = 0;
        store.expect_get().times(2).returning(move |code| {
            seen += 1;
            Ok((seen == 1).then(|| mock_offer_link(code, 1000, 0)))
        });
        store.expect_put().times(1).returning(|_, _| Ok(()));

        let state = TestStateBuilder::new().with_offer_link_store(store).build();
        state
            .offer_links()
            .create_link(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn redeem_increments_usage() {
        let state = TestStateBuilder::new().build();
        let service = state.offer_links();
        let link = service
            .create_link(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        let redeemed = service.redeem(&link.code).await.unwrap();

        assert_eq!(redeemed.current_uses, 1);
        assert_eq!(service.get_link(&link.code).await.unwrap().current_uses, 1);
    }

    #[tokio::test]
    async fn redeem_unknown_code_is_not_found() {
        let state = TestStateBuilder::new().build();

        let err = state.offer_links().redeem("NOSUCHCODE00").await.unwrap_err();

        assert!(matches!(err, CodeError::NotFound("offer link")));
    }

    #[tokio::test]
    async fn redeem_at_capacity_reports_limit() {
        let mut store = MockOfferLinkStore::new();
        store
            .expect_test_and_increment()
            .with(eq("FULLCODE0000"), eq(OFFER_LINK_TTL_SECS))
            .returning(|code, _| Ok(Redemption::AtCapacity(mock_offer_link(code, 1000, 1000))));

        let state = TestStateBuilder::new().with_offer_link_store(store).build();
        let err = state.offer_links().redeem("FULLCODE0000").await.unwrap_err();

        assert!(matches!(err, CodeError::CapacityExceeded { max_uses: 1000 }));
    }

    #[tokio::test]
    async fn quota_accepts_exactly_max_uses() {
        let state = TestStateBuilder::new().build();
        let service = state.offer_links();
        let link = service
            .create_link(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        for expected in 1..=1000 {
            let redeemed = service.redeem(&link.code).await.unwrap();
            assert_eq!(redeemed.current_uses, expected);
        }

        let err = service.redeem(&link.code).await.unwrap_err();
        assert!(matches!(err, CodeError::CapacityExceeded { .. }));
        assert_eq!(service.get_link(&link.code).await.unwrap().current_uses, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_redemptions_never_exceed_quota() {
        let store = Arc::new(MemoryStore::new());
        let link = mock_offer_link("RACECODE0000", 50, 0);
        store.put(&link, 60).await.unwrap();

        let service = Arc::new(OfferLinkService::new(store.clone(), "https://campcard.test"));
        let handles: Vec<_> = (0..200)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.redeem("RACECODE0000").await })
            })
            .collect();

        let mut succeeded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(CodeError::CapacityExceeded { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(succeeded, 50);
        assert_eq!(rejected, 150);
        assert_eq!(store.get("RACECODE0000").await.unwrap().unwrap().current_uses, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_link_behaves_like_missing() {
        let state = TestStateBuilder::new().build();
        let service = state.offer_links();
        let link = service
            .create_link(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        tokio::time::advance(StdDuration::from_secs(OFFER_LINK_TTL_SECS + 1)).await;

        assert!(matches!(
            service.redeem(&link.code).await.unwrap_err(),
            CodeError::NotFound("offer link")
        ));
        assert!(matches!(
            service.get_link(&link.code).await.unwrap_err(),
            CodeError::NotFound("offer link")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn redemption_restarts_expiry() {
        let state = TestStateBuilder::new().build();
        let service = state.offer_links();
        let link = service
            .create_link(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        tokio::time::advance(StdDuration::from_secs(89 * 24 * 60 * 60)).await;
        let redeemed = service.redeem(&link.code).await.unwrap();
        assert!(redeemed.expires_at >= link.expires_at);

        tokio::time::advance(StdDuration::from_secs(2 * 24 * 60 * 60)).await;
        let again = service.redeem(&link.code).await.unwrap();

        assert_eq!(again.current_uses, 2);
    }

    #[test]
    fn offer_url_uses_short_path() {
        let state = TestStateBuilder::new().build();
        let link = mock_offer_link("ABCDEFGHIJKL", 1000, 0);

        assert_eq!(
            state.offer_links().offer_url(&link),
            "https://campcard.test/o/ABCDEFGHIJKL"
        );
    }
}
