//! Subscriber model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::plan::SubscriptionTier;

/// Subscription state for one user account, kept in sync by payment
/// provider webhooks. A user without a row is on the free tier.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscriber {
    pub subscriber_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub subscribed: bool,
    pub subscription_tier: Option<String>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscriber {
    /// Effective tier; absent or unknown tier strings resolve to free.
    pub fn tier(&self) -> SubscriptionTier {
        self.subscription_tier
            .as_deref()
            .map(SubscriptionTier::from_string)
            .unwrap_or(SubscriptionTier::Free)
    }
}

/// Subscription state as reported to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionState {
    pub subscribed: bool,
    pub subscription_tier: SubscriptionTier,
    pub subscription_end: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    pub fn free() -> Self {
        Self {
            subscribed: false,
            subscription_tier: SubscriptionTier::Free,
            subscription_end: None,
        }
    }
}

impl From<&Subscriber> for SubscriptionState {
    fn from(subscriber: &Subscriber) -> Self {
        Self {
            subscribed: subscriber.subscribed,
            subscription_tier: subscriber.tier(),
            subscription_end: subscriber.subscription_end,
        }
    }
}
