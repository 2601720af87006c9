//! Stripe payment provider client.
//!
//! Implements the slice of Stripe's API this service needs: customer
//! creation, subscription checkout sessions, and webhook signature
//! verification. Stripe takes form-encoded request bodies and authenticates
//! with the secret key as basic-auth username.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;

use crate::config::StripeConfig;
use crate::models::SubscriptionTier;

/// Stripe client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

/// Customer record, as much of it as this service reads.
#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
}

/// Hosted checkout session.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect URL for the hosted page. Absent once a session expires.
    pub url: Option<String>,
}

/// Webhook event envelope. `data.object` stays raw until the event type is
/// known; see [`WebhookEvent::subscription`].
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Decode the payload as a subscription object, for the
    /// `customer.subscription.*` family of events.
    pub fn subscription(&self) -> Result<SubscriptionObject> {
        serde_json::from_value(self.data.object.clone())
            .map_err(|e| anyhow!("Malformed subscription payload: {}", e))
    }
}

/// Subscription object carried by `customer.subscription.*` events.
#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl SubscriptionObject {
    /// Price id of the first subscription item, when present.
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .map(|item| item.price.id.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItem {
    pub price: SubscriptionPrice,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionPrice {
    pub id: String,
}

/// Stripe API error envelope.
#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check whether credentials are set. Checkout and webhook handling are
    /// disabled without them.
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    /// Price id for a paid tier, when configured. The free tier has none.
    pub fn price_for_tier(&self, tier: SubscriptionTier) -> Option<&str> {
        let price = match tier {
            SubscriptionTier::Free => return None,
            SubscriptionTier::Pro => self.config.price_pro.as_str(),
            SubscriptionTier::Business => self.config.price_business.as_str(),
        };
        (!price.is_empty()).then_some(price)
    }

    /// Tier a subscription price belongs to; unknown prices map to free.
    pub fn tier_for_price(&self, price_id: &str) -> SubscriptionTier {
        if !self.config.price_pro.is_empty() && price_id == self.config.price_pro {
            SubscriptionTier::Pro
        } else if !self.config.price_business.is_empty()
            && price_id == self.config.price_business
        {
            SubscriptionTier::Business
        } else {
            SubscriptionTier::Free
        }
    }

    /// Create a customer, tagging it with our user id for reconciliation.
    pub async fn create_customer(&self, email: &str, user_id: &str) -> Result<StripeCustomer> {
        let params = [("email", email), ("metadata[user_id]", user_id)];
        let customer: StripeCustomer = self.post_form("/customers", &params).await?;

        tracing::info!(customer_id = %customer.id, "Stripe customer created");

        Ok(customer)
    }

    /// Create a hosted checkout session for a subscription price.
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let params = [
            ("customer", customer_id),
            ("mode", "subscription"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("allow_promotion_codes", "true"),
        ];
        let session: CheckoutSession = self.post_form("/checkout/sessions", &params).await?;

        tracing::info!(
            session_id = %session.id,
            customer_id = %customer_id,
            price_id = %price_id,
            "Checkout session created"
        );

        Ok(session)
    }

    /// Verify a `Stripe-Signature` header against the raw request body.
    ///
    /// The header carries `t=<timestamp>,v1=<signature>[,v1=...]`; the
    /// signed payload is `"{t}.{body}"` under HMAC-SHA256 with the webhook
    /// secret.
    pub fn verify_webhook_signature(&self, body: &str, signature_header: &str) -> Result<bool> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| anyhow!("Signature header is missing a timestamp"))?;
        if candidates.is_empty() {
            return Err(anyhow!("Signature header carries no v1 signature"));
        }

        let payload = format!("{}.{}", timestamp, body);
        let expected =
            self.compute_signature(&payload, self.config.webhook_secret.expose_secret())?;

        let is_valid = candidates.iter().any(|candidate| *candidate == expected);

        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }

        Ok(is_valid)
    }

    /// Parse a webhook event from the raw request body.
    pub fn parse_webhook_event(&self, body: &str) -> Result<WebhookEvent> {
        let event: WebhookEvent = serde_json::from_str(body)?;
        Ok(event)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        if !self.is_configured() {
            return Err(anyhow!("Stripe credentials not configured"));
        }

        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .client
            .post(&url)
            .basic_auth(self.config.secret_key.expose_secret(), None::<&str>)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, path = %path, "Stripe response");

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            let error: StripeErrorResponse =
                serde_json::from_str(&body).unwrap_or_else(|_| StripeErrorResponse {
                    error: StripeErrorDetail {
                        error_type: None,
                        code: None,
                        message: Some(body.clone()),
                    },
                });
            tracing::error!(
                error_type = error.error.error_type.as_deref().unwrap_or("unknown"),
                code = error.error.code.as_deref().unwrap_or(""),
                message = error.error.message.as_deref().unwrap_or(""),
                "Stripe request failed"
            );
            Err(anyhow!(
                "Stripe error: {}",
                error.error.message.unwrap_or_else(|| status.to_string())
            ))
        }
    }

    /// Compute HMAC-SHA256 signature, hex encoded.
    fn compute_signature(&self, payload: &str, secret: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| anyhow!("Invalid key length"))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn test_config() -> StripeConfig {
        StripeConfig {
            secret_key: Secret::new("sk_test_123".to_string()),
            webhook_secret: Secret::new("whsec_test".to_string()),
            api_base_url: "https://api.stripe.com/v1".to_string(),
            price_pro: "price_pro_123".to_string(),
            price_business: "price_biz_456".to_string(),
        }
    }

    #[test]
    fn test_is_configured() {
        let client = StripeClient::new(test_config());
        assert!(client.is_configured());

        let mut config = test_config();
        config.secret_key = Secret::new(String::new());
        let client = StripeClient::new(config);
        assert!(!client.is_configured());
    }

    #[test]
    fn test_price_tier_mapping() {
        let client = StripeClient::new(test_config());

        assert_eq!(
            client.tier_for_price("price_pro_123"),
            SubscriptionTier::Pro
        );
        assert_eq!(
            client.tier_for_price("price_biz_456"),
            SubscriptionTier::Business
        );
        assert_eq!(
            client.tier_for_price("price_unknown"),
            SubscriptionTier::Free
        );

        assert_eq!(
            client.price_for_tier(SubscriptionTier::Pro),
            Some("price_pro_123")
        );
        assert_eq!(client.price_for_tier(SubscriptionTier::Free), None);
    }

    #[test]
    fn test_webhook_signature_verification() {
        let client = StripeClient::new(test_config());

        let body = r#"{"id":"evt_1","type":"customer.subscription.updated"}"#;
        let payload = format!("1718452800.{}", body);
        let signature = client.compute_signature(&payload, "whsec_test").unwrap();
        let header = format!("t=1718452800,v1={}", signature);

        assert!(client.verify_webhook_signature(body, &header).unwrap());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let client = StripeClient::new(test_config());

        let payload = format!("1718452800.{}", r#"{"id":"evt_1"}"#);
        let signature = client.compute_signature(&payload, "whsec_test").unwrap();
        let header = format!("t=1718452800,v1={}", signature);

        assert!(!client
            .verify_webhook_signature(r#"{"id":"evt_2"}"#, &header)
            .unwrap());
    }

    #[test]
    fn test_malformed_signature_header() {
        let client = StripeClient::new(test_config());

        assert!(client
            .verify_webhook_signature("{}", "v1=deadbeef")
            .is_err());
        assert!(client.verify_webhook_signature("{}", "t=123").is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses_api_calls() {
        let mut config = test_config();
        config.secret_key = Secret::new(String::new());
        let client = StripeClient::new(config);

        let err = client
            .create_customer("user@example.com", "u-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_subscription_payload_decoding() {
        let client = StripeClient::new(test_config());
        let body = r#"{
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "data": {
                "object": {
                    "id": "sub_1",
                    "customer": "cus_1",
                    "status": "active",
                    "current_period_end": 1721044800,
                    "items": {"data": [{"price": {"id": "price_pro_123"}}]}
                }
            }
        }"#;

        let event = client.parse_webhook_event(body).unwrap();
        assert_eq!(event.event_type, "customer.subscription.updated");

        let subscription = event.subscription().unwrap();
        assert_eq!(subscription.customer, "cus_1");
        assert_eq!(subscription.status, "active");
        assert_eq!(subscription.price_id(), Some("price_pro_123"));
        assert_eq!(
            client.tier_for_price(subscription.price_id().unwrap()),
            SubscriptionTier::Pro
        );
    }
}
