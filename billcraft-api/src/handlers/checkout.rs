//! Checkout session handlers.
//!
//! An upgrade starts here after the UI receives a gating denial. The
//! handler returns the hosted checkout redirect URL; the resulting
//! subscription lands via webhook, not through this path.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::middleware::AuthContext;
use crate::models::SubscriptionTier;
use crate::services::metrics::CHECKOUT_SESSIONS_TOTAL;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutSessionRequest {
    pub tier: SubscriptionTier,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutSessionResponse {
    /// Redirect URL of the hosted checkout page.
    pub url: String,
}

/// Create a hosted checkout session for a paid tier.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<CreateCheckoutSessionResponse>, AppError> {
    let price_id = state
        .stripe
        .price_for_tier(payload.tier)
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "No checkout price is configured for the {} plan",
                payload.tier.as_str()
            ))
        })?
        .to_string();

    // Reuse the provider customer when one is on file; create and record
    // it otherwise.
    let subscriber = state.db.get_subscriber(auth.user_id).await?;
    let customer_id = match subscriber.and_then(|s| s.stripe_customer_id) {
        Some(id) => id,
        None => {
            let customer = state
                .stripe
                .create_customer(&auth.email, &auth.user_id.to_string())
                .await
                .map_err(|e| AppError::BadGateway(format!("Customer creation failed: {}", e)))?;

            state
                .db
                .upsert_stripe_customer(auth.user_id, &auth.email, &customer.id)
                .await?;

            customer.id
        }
    };

    let session = state
        .stripe
        .create_checkout_session(
            &customer_id,
            &price_id,
            &payload.success_url,
            &payload.cancel_url,
        )
        .await
        .map_err(|e| AppError::BadGateway(format!("Checkout session creation failed: {}", e)))?;

    let url = session
        .url
        .ok_or_else(|| AppError::BadGateway("Checkout session has no redirect URL".to_string()))?;

    CHECKOUT_SESSIONS_TOTAL
        .with_label_values(&[payload.tier.as_str()])
        .inc();

    Ok(Json(CreateCheckoutSessionResponse { url }))
}
