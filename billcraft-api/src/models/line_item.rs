//! Invoice line item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One billable entry on an invoice. `amount` is always derived as
/// quantity × unit_rate; it is never independently edited.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for a line item. Positions in the submitted list become
/// `sort_order`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
}
