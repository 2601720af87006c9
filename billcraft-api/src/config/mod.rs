use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthConfig {
    /// Shared secret the hosted auth provider signs access tokens with.
    pub jwt_secret: Secret<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    /// Price ids for the paid tiers; empty when checkout is not configured.
    pub price_pro: String,
    pub price_business: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("BILLCRAFT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("BILLCRAFT_PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()?;

        let db_url = env::var("BILLCRAFT_DATABASE_URL").expect("BILLCRAFT_DATABASE_URL must be set");
        let max_connections = env::var("BILLCRAFT_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("BILLCRAFT_DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()?;

        let jwt_secret = env::var("BILLCRAFT_JWT_SECRET").expect("BILLCRAFT_JWT_SECRET must be set");

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").unwrap_or_default();
        let stripe_webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();
        let stripe_api_base_url = env::var("STRIPE_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string());
        let price_pro = env::var("STRIPE_PRICE_PRO").unwrap_or_default();
        let price_business = env::var("STRIPE_PRICE_BUSINESS").unwrap_or_default();

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(jwt_secret),
            },
            stripe: StripeConfig {
                secret_key: Secret::new(stripe_secret_key),
                webhook_secret: Secret::new(stripe_webhook_secret),
                api_base_url: stripe_api_base_url,
                price_pro,
                price_business,
            },
            service_name: "billcraft-api".to_string(),
        })
    }
}
