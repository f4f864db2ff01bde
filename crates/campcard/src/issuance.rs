//! Code issuance and redemption.
//!
//! - **user_codes** - Idempotent 30-day referral codes per scout, plus share links
//! - **offer_links** - Fresh offer links with a usage quota and atomic redemption
//! - **cards** - Ledger-checked card number allocation

mod cards;
mod offer_links;
mod user_codes;

pub use cards::CardAllocator;
pub use offer_links::OfferLinkService;
pub use user_codes::UserCodeIssuer;
