mod codegen;
mod commands;
mod config;
mod error;
mod issuance;
mod models;
mod purchase;
mod repos;
mod services;
mod state;
mod stores;
#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::{
    config::Config,
    models::PurchaseRequest,
    repos::{PgAccountLedger, PgUserDirectory, Repos},
    services::{GatewayPaymentVerifier, gateway},
    state::AppState,
    stores::Stores,
};

#[derive(Parser)]
#[command(name = "campcard")]
#[command(about = "Referral codes, offer links and card numbers for Campcard")]
#[command(version)]
#[command(after_help = "Examples:
  campcard issue-code <user-id>            Show a scout's referral code
  campcard create-link <offer-id> <user-id> Mint a new offer link
  campcard redeem ABCDEFGHIJKL             Consume one use of an offer link")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations and exit
    Migrate,

    /// Issue (or show) a scout's referral code and share links
    IssueCode {
        /// Scout user ID
        user_id: Uuid,
    },

    /// Find the scout that owns a referral code
    LookupCode {
        code: String,
    },

    /// Create a new offer link
    CreateLink {
        offer_id: Uuid,
        /// User sharing the link
        user_id: Uuid,
    },

    /// Consume one use of an offer link
    Redeem {
        code: String,
    },

    /// Show an offer link without consuming a use
    ShowLink {
        code: String,
    },

    /// Allocate an unused card number
    AllocateCard,

    /// Verify a payment and create the account and subscription
    Purchase {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Payment gateway transaction reference
        #[arg(long = "transaction")]
        transaction_ref: String,
        /// Referral code of the scout credited with the sale
        #[arg(long)]
        scout_code: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = envy::prefixed("CAMPCARD_").from_env::<Config>()?;

    // Guard must outlive every command so queued events flush on exit
    let _sentry_guard = config.sentry_dsn.as_ref().map(|dsn| {
        sentry::init((
            dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.env.clone().into()),
                ..Default::default()
            },
        ))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.is_production() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Link and code commands never touch Postgres
    let database = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&config.database_url)?;

    if let Commands::Migrate = cli.command {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&database).await?;
        tracing::info!("Migrations complete");
        return Ok(());
    }

    let stores = match config.redis_url.as_deref() {
        Some(url) => Stores::redis(redis::Client::open(url)?),
        None => {
            tracing::warn!("CAMPCARD_REDIS_URL not set, codes will not outlive this process");
            Stores::memory()
        }
    };
    if !stores.user_codes.health_check().await? {
        anyhow::bail!("ephemeral store is not responding");
    }

    let repos = Repos {
        accounts: Arc::new(PgAccountLedger::new(database.clone())),
        users: Arc::new(PgUserDirectory::new(database)),
    };

    let gateway = gateway::Client::new(&config.payment_api_url, &config.payment_api_key);

    let state = AppState {
        config,
        repos,
        stores,
        payments: Arc::new(GatewayPaymentVerifier::new(gateway)),
    };

    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::IssueCode { user_id } => commands::issue_code(&state, user_id).await,
        Commands::LookupCode { code } => commands::lookup_code(&state, &code).await,
        Commands::CreateLink { offer_id, user_id } => {
            commands::create_link(&state, offer_id, user_id).await
        }
        Commands::Redeem { code } => commands::redeem(&state, &code).await,
        Commands::ShowLink { code } => commands::show_link(&state, &code).await,
        Commands::AllocateCard => commands::allocate_card(&state).await,
        Commands::Purchase {
            email,
            first_name,
            last_name,
            transaction_ref,
            scout_code,
        } => {
            let request = PurchaseRequest {
                email,
                first_name,
                last_name,
                transaction_ref,
                scout_code,
            };
            commands::purchase(&state, request).await
        }
    }
}
