//! Client management handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::subscription::plan_for_user;
use crate::middleware::AuthContext;
use crate::models::{Client, CreateClient, UpdateClient};
use crate::services::metrics::GATING_DENIED_TOTAL;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

/// List the caller's clients.
pub async fn list_clients(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<Client>>, AppError> {
    let clients = state.db.list_clients(auth.user_id).await?;
    Ok(Json(clients))
}

/// Create a client, subject to the caller's plan limit.
pub async fn create_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    payload.validate()?;

    let plan = plan_for_user(&state, &auth).await?;
    let current_count = state.db.count_clients(auth.user_id).await?;
    if !plan.limits.allows_client(current_count) {
        GATING_DENIED_TOTAL.with_label_values(&["client"]).inc();
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Client limit reached for the {} plan; upgrade to add more clients",
            plan.name
        )));
    }

    let client = state
        .db
        .create_client(&CreateClient {
            user_id: auth.user_id,
            name: payload.name,
            email: payload.email,
            phone: payload.phone,
            address: payload.address,
            city: payload.city,
            state: payload.state,
            zip: payload.zip,
            country: payload.country,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(client)))
}

/// Get one client.
pub async fn get_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    let client = state
        .db
        .get_client(auth.user_id, client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    Ok(Json(client))
}

/// Update a client.
pub async fn update_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<UpdateClientRequest>,
) -> Result<Json<Client>, AppError> {
    payload.validate()?;

    let client = state
        .db
        .update_client(
            auth.user_id,
            client_id,
            &UpdateClient {
                name: payload.name,
                email: payload.email,
                phone: payload.phone,
                address: payload.address,
                city: payload.city,
                state: payload.state,
                zip: payload.zip,
                country: payload.country,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    Ok(Json(client))
}

/// Delete a client.
pub async fn delete_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_client(auth.user_id, client_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Client not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
