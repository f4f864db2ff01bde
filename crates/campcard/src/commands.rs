//! One-shot support commands run by the `campcard` binary.
//!
//! Each command goes through the same issuers the services use, so codes
//! minted here are indistinguishable from codes minted in production.

use anyhow::Result;
use uuid::Uuid;

use crate::{
    error::CodeError,
    models::{OfferLink, PurchaseRequest},
    purchase::PurchaseOutcome,
    state::AppState,
};

pub async fn issue_code(state: &AppState, user_id: Uuid) -> Result<()> {
    let shared = state.user_codes().share(user_id).await.map_err(report)?;

    println!("Code:      {}", shared.user_code.code);
    println!("Expires:   {}", shared.user_code.expires_at.to_rfc3339());
    println!("Subscribe: {}", shared.subscribe_url);
    if shared.payload.is_degraded() {
        println!("QR (plain): {}", shared.payload.as_str());
    } else {
        println!("QR:        {}", shared.payload.as_str());
    }

    Ok(())
}

pub async fn lookup_code(state: &AppState, code: &str) -> Result<()> {
    let user_code = state
        .user_codes()
        .reverse_lookup(code)
        .await
        .map_err(report)?;

    println!("User:    {}", user_code.user_id);
    println!("Expires: {}", user_code.expires_at.to_rfc3339());

    Ok(())
}

pub async fn create_link(state: &AppState, offer_id: Uuid, user_id: Uuid) -> Result<()> {
    let service = state.offer_links();
    let link = service
        .create_link(offer_id, user_id)
        .await
        .map_err(report)?;

    println!("{}", describe_link(&link, &service.offer_url(&link)));

    Ok(())
}

pub async fn redeem(state: &AppState, code: &str) -> Result<()> {
    let link = state.offer_links().redeem(code).await.map_err(report)?;

    println!(
        "Redeemed {} for offer {} ({} uses left)",
        link.code,
        link.offer_id,
        link.remaining_uses()
    );

    Ok(())
}

pub async fn show_link(state: &AppState, code: &str) -> Result<()> {
    let service = state.offer_links();
    let link = service.get_link(code).await.map_err(report)?;

    println!("{}", describe_link(&link, &service.offer_url(&link)));

    Ok(())
}

pub async fn allocate_card(state: &AppState) -> Result<()> {
    let card = state.cards().allocate().await.map_err(report)?;
    println!("{}", card);
    Ok(())
}

/// Prints the outcome as JSON. A failed purchase exits non-zero.
pub async fn purchase(state: &AppState, request: PurchaseRequest) -> Result<()> {
    let outcome = state.purchases().run(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        PurchaseOutcome::Completed(_) => Ok(()),
        PurchaseOutcome::Failed { code, .. } => {
            anyhow::bail!("purchase failed: {}", code.as_str())
        }
    }
}

fn describe_link(link: &OfferLink, url: &str) -> String {
    format!(
        "Code:    {}\nURL:     {}\nOffer:   {}\nIssuer:  {}\nUses:    {}/{}\nExpires: {}",
        link.code,
        url,
        link.offer_id,
        link.issuing_user_id,
        link.current_uses,
        link.max_uses,
        link.expires_at.to_rfc3339()
    )
}

/// Turn a `CodeError` into something printable at the top level.
fn report(err: CodeError) -> anyhow::Error {
    match err {
        CodeError::Internal(e) => e,
        other => anyhow::anyhow!("{} ({})", other, other.code()),
    }
}
