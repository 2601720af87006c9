//! Infrastructure services for billcraft-api.

pub mod database;
pub mod metrics;
pub mod stripe;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use stripe::StripeClient;
