//! Subscription state and plan catalogue handlers.

use axum::extract::State;
use axum::Json;
use service_core::error::AppError;

use crate::middleware::AuthContext;
use crate::models::{Plan, SubscriptionState, SubscriptionTier};
use crate::AppState;

/// Resolve the caller's effective plan. A missing subscriber row means the
/// free tier.
pub(crate) async fn plan_for_user(
    state: &AppState,
    auth: &AuthContext,
) -> Result<&'static Plan, AppError> {
    let subscriber = state.db.get_subscriber(auth.user_id).await?;
    let tier = subscriber
        .as_ref()
        .map(|s| s.tier())
        .unwrap_or(SubscriptionTier::Free);

    Ok(Plan::for_tier(tier))
}

/// The caller's subscription state.
pub async fn get_subscription(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<SubscriptionState>, AppError> {
    let subscriber = state.db.get_subscriber(auth.user_id).await?;
    let subscription = subscriber
        .as_ref()
        .map(SubscriptionState::from)
        .unwrap_or_else(SubscriptionState::free);

    Ok(Json(subscription))
}

/// The static plan catalogue.
pub async fn list_plans() -> Json<&'static [Plan]> {
    Json(Plan::all())
}
