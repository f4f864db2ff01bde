//! Payment verification abstraction wrapping the gateway client.

use anyhow::Result;
use async_trait::async_trait;

use super::gateway;

/// Verdict on a transaction reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved,
    Declined { reason: String },
}

/// Payment verifier trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Verify that a transaction settled successfully.
    async fn verify(&self, transaction_ref: &str) -> Result<PaymentOutcome>;
}

/// Gateway implementation of PaymentVerifier.
pub struct GatewayPaymentVerifier {
    client: gateway::Client,
}

impl GatewayPaymentVerifier {
    pub fn new(client: gateway::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentVerifier for GatewayPaymentVerifier {
    async fn verify(&self, transaction_ref: &str) -> Result<PaymentOutcome> {
        let transaction = match self.client.get_transaction(transaction_ref).await {
            Ok(transaction) => transaction,
            // Unknown references are a decline, not an outage
            Err(gateway::Error::Api { status: 404, .. }) => {
                return Ok(PaymentOutcome::Declined {
                    reason: "transaction not found".into(),
                });
            }
            Err(e) => return Err(anyhow::anyhow!("Payment verification failed: {}", e)),
        };

        Ok(judge(transaction_ref, transaction))
    }
}

fn judge(requested: &str, transaction: gateway::TransactionResponse) -> PaymentOutcome {
    // The gateway must answer for the reference we asked about
    if transaction.reference != requested {
        tracing::warn!(
            requested = %requested,
            returned = %transaction.reference,
            "gateway returned a different transaction"
        );
        return PaymentOutcome::Declined {
            reason: "transaction reference mismatch".into(),
        };
    }

    if transaction.is_approved() {
        PaymentOutcome::Approved
    } else {
        PaymentOutcome::Declined {
            reason: transaction
                .reason
                .unwrap_or_else(|| format!("transaction {}", transaction.status)),
        }
    }
}
