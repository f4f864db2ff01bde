use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    /// Redis URL for the ephemeral store. Codes live in process memory when unset.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Public origin used to build subscribe and offer links (no trailing slash).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Payment gateway verification endpoint.
    pub payment_api_url: String,
    pub payment_api_key: String,
    /// Set to "production" for JSON logging, anything else for human-readable.
    #[serde(default)]
    pub env: String,
    /// Sentry DSN for error tracking
    #[serde(default)]
    pub sentry_dsn: Option<String>,
}

fn default_base_url() -> String {
    "https://campcardapp.org".into()
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    /// Base URL with any trailing slash removed.
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
