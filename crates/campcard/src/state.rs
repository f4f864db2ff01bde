use std::sync::Arc;

use crate::{
    config::Config,
    issuance::{CardAllocator, OfferLinkService, UserCodeIssuer},
    purchase::PurchaseFlow,
    repos::Repos,
    services::PaymentVerifier,
    stores::Stores,
};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Database repositories.
    pub repos: Repos,
    /// Ephemeral stores (Redis or in-memory).
    pub stores: Stores,
    /// Payment gateway verification.
    pub payments: Arc<dyn PaymentVerifier>,
}

impl AppState {
    pub fn user_codes(&self) -> UserCodeIssuer {
        UserCodeIssuer::new(
            self.stores.user_codes.clone(),
            self.repos.users.clone(),
            self.config.origin(),
        )
    }

    pub fn offer_links(&self) -> OfferLinkService {
        OfferLinkService::new(self.stores.offer_links.clone(), self.config.origin())
    }

    pub fn cards(&self) -> CardAllocator {
        CardAllocator::new(self.repos.accounts.clone())
    }

    pub fn purchases(&self) -> PurchaseFlow {
        PurchaseFlow::new(
            self.repos.accounts.clone(),
            self.payments.clone(),
            self.cards(),
            self.user_codes(),
        )
    }
}
