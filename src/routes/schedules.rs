//! Schedule CRUD handlers. Bodies are YAML documents.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::schedule::{ScheduleSpec, TestJobSchedule};
use crate::routes::auth::TenantClaims;
use crate::routes::AppState;
use crate::services::schedule;

fn parse_spec(body: &str) -> Result<ScheduleSpec> {
    serde_yaml::from_str(body).map_err(|e| Error::invalid(format!("invalid YAML: {e}")))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    claims: TenantClaims,
    body: String,
) -> Result<(StatusCode, Json<TestJobSchedule>)> {
    let spec = parse_spec(&body)?;
    let saved =
        schedule::create_schedule(&state.pool, &claims.lob_id, &claims.team_id, spec).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    claims: TenantClaims,
) -> Result<Json<Vec<TestJobSchedule>>> {
    let rows = schedule::list_schedules(&state.pool, &claims.lob_id, &claims.team_id).await?;
    Ok(Json(rows))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(id): Path<Uuid>,
) -> Result<Json<TestJobSchedule>> {
    let row = schedule::get_schedule(&state.pool, id, &claims.lob_id, &claims.team_id).await?;
    Ok(Json(row))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(id): Path<Uuid>,
    body: String,
) -> Result<Json<TestJobSchedule>> {
    let spec = parse_spec(&body)?;
    let row =
        schedule::update_schedule(&state.pool, id, &claims.lob_id, &claims.team_id, spec).await?;
    Ok(Json(row))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    schedule::delete_schedule(&state.pool, id, &claims.lob_id, &claims.team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
