pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod numbering;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use services::{Database, StripeClient};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub stripe: StripeClient,
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        services::init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let stripe = StripeClient::new(config.stripe.clone());
        if stripe.is_configured() {
            tracing::info!("Stripe client initialized");
        } else {
            tracing::warn!("Stripe credentials not configured - checkout features will be limited");
        }

        let state = AppState {
            db,
            config: config.clone(),
            stripe,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_endpoint))
            // Client endpoints (caller-scoped)
            .route(
                "/clients",
                get(handlers::clients::list_clients).post(handlers::clients::create_client),
            )
            .route(
                "/clients/:id",
                get(handlers::clients::get_client)
                    .put(handlers::clients::update_client)
                    .delete(handlers::clients::delete_client),
            )
            // Invoice endpoints
            .route(
                "/invoices",
                get(handlers::invoices::list_invoices).post(handlers::invoices::create_invoice),
            )
            .route(
                "/invoices/:id",
                get(handlers::invoices::get_invoice)
                    .put(handlers::invoices::update_invoice)
                    .delete(handlers::invoices::delete_invoice),
            )
            // Subscription endpoints
            .route("/subscription", get(handlers::subscription::get_subscription))
            .route("/plans", get(handlers::subscription::list_plans))
            .route(
                "/checkout/session",
                post(handlers::checkout::create_checkout_session),
            )
            // Webhooks from the payment provider, not the frontend
            .route("/webhooks/stripe", post(handlers::webhooks::stripe_webhook))
            .layer(from_fn(security_headers_middleware))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                        user_id = tracing::field::Empty,
                    )
                }),
            )
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(state);

        Ok(Self {
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
