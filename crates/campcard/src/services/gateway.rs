//! Payment gateway HTTP client.
//!
//! Only the transaction lookup endpoint is used: the gateway reports the
//! settlement state of a transaction reference the buyer received at checkout.

use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Look up a transaction by reference.
    pub async fn get_transaction(&self, reference: &str) -> Result<TransactionResponse, Error> {
        let response = self
            .http
            .post(format!(
                "{}/transactions/verify",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .json(&VerifyTransactionRequest { reference })
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }
}

#[derive(Debug)]
pub enum Error {
    Request(String),
    Api { status: u16, message: String },
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Request(e) => write!(f, "request failed: {}", e),
            Error::Api { status, message } => write!(f, "gateway error {}: {}", status, message),
            Error::Parse(e) => write!(f, "parse error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Serialize)]
struct VerifyTransactionRequest<'a> {
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TransactionResponse {
    pub reference: String,
    /// "approved", "declined", "pending", ...
    pub status: String,
    #[serde(rename = "responseReasonText", default)]
    pub reason: Option<String>,
}

impl TransactionResponse {
    pub fn is_approved(&self) -> bool {
        self.status.eq_ignore_ascii_case("approved") || self.status.eq_ignore_ascii_case("settled")
    }
}
