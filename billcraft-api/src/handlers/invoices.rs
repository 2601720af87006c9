//! Invoice handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::subscription::plan_for_user;
use crate::middleware::AuthContext;
use crate::models::{
    CreateInvoice, CreateInvoiceItem, Invoice, InvoiceItem, InvoiceStatus, ListInvoicesFilter,
    UpdateInvoice,
};
use crate::services::metrics::GATING_DENIED_TOTAL;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct InvoiceItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: Option<Uuid>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tax_rate: Decimal,
    pub notes: Option<String>,
    pub terms: Option<String>,
    #[serde(default)]
    pub items: Vec<InvoiceItemRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub client_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub currency: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    /// When present, replaces the stored line items.
    pub items: Option<Vec<InvoiceItemRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

/// An invoice with its line items.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// The totals computation is sign-agnostic; non-negative quantities and
/// rates, and a tax rate within [0,100], are a contract of this API
/// surface.
fn validate_amounts(items: &[InvoiceItemRequest], tax_rate: Decimal) -> Result<(), AppError> {
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE_HUNDRED {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "tax_rate must be between 0 and 100"
        )));
    }

    for item in items {
        item.validate()?;
        if item.quantity < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "quantity must not be negative"
            )));
        }
        if item.unit_rate < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "unit_rate must not be negative"
            )));
        }
    }

    Ok(())
}

fn to_item_inputs(items: Vec<InvoiceItemRequest>) -> Vec<CreateInvoiceItem> {
    items
        .into_iter()
        .map(|item| CreateInvoiceItem {
            description: item.description,
            quantity: item.quantity,
            unit_rate: item.unit_rate,
        })
        .collect()
}

/// List the caller's invoices.
pub async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let filter = ListInvoicesFilter {
        status: query.status.as_deref().map(InvoiceStatus::from_string),
        client_id: query.client_id,
        page_size: query.page_size.unwrap_or(50),
        page_token: query.page_token,
    };

    let invoices = state.db.list_invoices(auth.user_id, &filter).await?;
    Ok(Json(invoices))
}

/// Create an invoice with its line items, subject to the caller's monthly
/// plan limit.
pub async fn create_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    validate_amounts(&payload.items, payload.tax_rate)?;

    let plan = plan_for_user(&state, &auth).await?;
    let today = Utc::now().date_naive();
    let month_start = today
        .with_day(1)
        .unwrap_or(today)
        .and_time(NaiveTime::MIN)
        .and_utc();
    let current_count = state
        .db
        .count_invoices_since(auth.user_id, month_start)
        .await?;
    if !plan.limits.allows_invoice(current_count) {
        GATING_DENIED_TOTAL.with_label_values(&["invoice"]).inc();
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Monthly invoice limit reached for the {} plan; upgrade for unlimited invoices",
            plan.name
        )));
    }

    let items = to_item_inputs(payload.items);
    let (invoice, items) = state
        .db
        .create_invoice(
            &CreateInvoice {
                user_id: auth.user_id,
                client_id: payload.client_id,
                currency: payload.currency,
                issue_date: payload.issue_date,
                due_date: payload.due_date,
                tax_rate: payload.tax_rate,
                notes: payload.notes,
                terms: payload.terms,
            },
            &items,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(InvoiceResponse { invoice, items })))
}

/// Get one invoice with its line items.
pub async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .db
        .get_invoice(auth.user_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    let items = state.db.get_invoice_items(invoice_id).await?;

    Ok(Json(InvoiceResponse { invoice, items }))
}

/// Update an invoice; totals are recomputed from the effective items and
/// tax rate.
pub async fn update_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    validate_amounts(
        payload.items.as_deref().unwrap_or(&[]),
        payload.tax_rate.unwrap_or(Decimal::ZERO),
    )?;

    let items = payload.items.map(to_item_inputs);
    let (invoice, items) = state
        .db
        .update_invoice(
            auth.user_id,
            invoice_id,
            &UpdateInvoice {
                client_id: payload.client_id,
                status: payload.status,
                currency: payload.currency,
                issue_date: payload.issue_date,
                due_date: payload.due_date,
                tax_rate: payload.tax_rate,
                notes: payload.notes,
                terms: payload.terms,
            },
            items.as_deref(),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    Ok(Json(InvoiceResponse { invoice, items }))
}

/// Delete an invoice and its line items.
pub async fn delete_invoice(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_invoice(auth.user_id, invoice_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
