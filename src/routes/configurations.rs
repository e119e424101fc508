//! User configuration CRUD handlers. Bodies are YAML documents.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::error::Result;
use crate::models::configuration::UserConfigurationRow;
use crate::routes::auth::TenantClaims;
use crate::routes::AppState;

pub async fn create_configuration(
    State(state): State<AppState>,
    claims: TenantClaims,
    body: String,
) -> Result<(StatusCode, Json<UserConfigurationRow>)> {
    let row = state
        .policy
        .create_user_configuration_from_yaml(
            &claims.lob_id,
            &claims.team_id,
            &claims.user_id,
            &body,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn list_configurations(
    State(state): State<AppState>,
    claims: TenantClaims,
) -> Result<Json<Vec<UserConfigurationRow>>> {
    let rows = state
        .policy
        .list_user_configurations(&claims.lob_id, &claims.team_id, &claims.user_id)
        .await?;
    Ok(Json(rows))
}

pub async fn get_configuration(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(id): Path<Uuid>,
) -> Result<Json<UserConfigurationRow>> {
    let row = state
        .policy
        .get_user_configuration(id, &claims.lob_id, &claims.team_id)
        .await?;
    Ok(Json(row))
}

pub async fn update_configuration(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(id): Path<Uuid>,
    body: String,
) -> Result<Json<UserConfigurationRow>> {
    let row = state
        .policy
        .update_user_configuration(id, &claims.lob_id, &claims.team_id, &body)
        .await?;
    Ok(Json(row))
}

pub async fn delete_configuration(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state
        .policy
        .delete_user_configuration(id, &claims.lob_id, &claims.team_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
