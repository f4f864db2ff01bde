//! External service abstractions.
//!
//! Each external collaborator sits behind a trait so tests can mock it.
//!
//! ## Services
//!
//! - **payments** - Transaction verification against the payment gateway
//! - **gateway** - Low-level payment gateway HTTP client (used by payments)

pub mod gateway;
mod payments;

pub use payments::{GatewayPaymentVerifier, PaymentOutcome, PaymentVerifier};

#[cfg(test)]
pub use payments::MockPaymentVerifier;
