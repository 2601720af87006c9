//! Payment provider webhook handler.
//!
//! The provider signs each delivery over the raw body; nothing in the
//! payload is trusted before the signature checks out. Subscription
//! lifecycle events are applied to the subscriber row addressed by the
//! provider customer id.

use axum::extract::State;
use axum::http::HeaderMap;
use chrono::DateTime;
use service_core::error::AppError;

use crate::models::SubscriptionTier;
use crate::services::metrics::WEBHOOK_EVENTS_TOTAL;
use crate::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Handle a webhook delivery from the payment provider.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<&'static str, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing Stripe-Signature header")))?;

    let valid = state
        .stripe
        .verify_webhook_signature(&body, signature)
        .map_err(|e| AppError::Unauthorized(anyhow::anyhow!("Signature verification failed: {}", e)))?;
    if !valid {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Webhook signature mismatch"
        )));
    }

    let event = state
        .stripe
        .parse_webhook_event(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed webhook payload: {}", e)))?;

    WEBHOOK_EVENTS_TOTAL
        .with_label_values(&[event.event_type.as_str()])
        .inc();
    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Webhook event received");

    match event.event_type.as_str() {
        "customer.subscription.created" | "customer.subscription.updated" => {
            let subscription = event.subscription().map_err(AppError::BadRequest)?;
            let tier = subscription
                .price_id()
                .map(|price| state.stripe.tier_for_price(price))
                .unwrap_or(SubscriptionTier::Free);
            let subscribed = subscription.status == "active";
            let period_end = subscription
                .current_period_end
                .and_then(|ts| DateTime::from_timestamp(ts, 0));

            let touched = state
                .db
                .update_subscription_by_customer(
                    &subscription.customer,
                    subscribed,
                    tier.as_str(),
                    period_end,
                )
                .await?;
            if touched == 0 {
                tracing::warn!(
                    customer_id = %subscription.customer,
                    "No subscriber matches webhook customer"
                );
            }
        }
        "customer.subscription.deleted" => {
            let subscription = event.subscription().map_err(AppError::BadRequest)?;
            let touched = state
                .db
                .update_subscription_by_customer(
                    &subscription.customer,
                    false,
                    SubscriptionTier::Free.as_str(),
                    None,
                )
                .await?;
            if touched == 0 {
                tracing::warn!(
                    customer_id = %subscription.customer,
                    "No subscriber matches webhook customer"
                );
            }
        }
        "invoice.payment_succeeded" => {
            tracing::info!(event_id = %event.id, "Subscription payment succeeded");
        }
        "invoice.payment_failed" => {
            tracing::warn!(event_id = %event.id, "Subscription payment failed");
        }
        other => {
            tracing::debug!(event_type = %other, "Unhandled webhook event type");
        }
    }

    Ok("Webhook processed successfully")
}
