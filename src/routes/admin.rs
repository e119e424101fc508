//! Admin surface: policy document, reporting aggregates, alert test.

use axum::extract::{Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::alert::AlertSeverity;
use crate::models::configuration::AdminConfiguration;
use crate::models::job::TestJob;
use crate::routes::auth::AdminClaims;
use crate::routes::AppState;
use crate::services::reporting::{
    self, ExecutionSummary, FailingTest, JobsFilter, LobExecutionSummary,
};

pub async fn get_admin_configuration(
    State(state): State<AppState>,
    _claims: AdminClaims,
) -> Result<String> {
    // Bypass the cache so admins read their own writes.
    let config = state.policy.get_admin_configuration(false).await?;
    serde_yaml::to_string(&config)
        .map_err(|e| Error::Internal(anyhow::anyhow!("serialize admin config: {e}")))
}

pub async fn put_admin_configuration(
    State(state): State<AppState>,
    claims: AdminClaims,
    body: String,
) -> Result<String> {
    let submitted: AdminConfiguration =
        serde_yaml::from_str(&body).map_err(|e| Error::invalid(format!("invalid YAML: {e}")))?;

    // Updates replace the current document in place.
    let current = state.policy.get_admin_configuration(false).await?;
    let mut config = submitted;
    config.id = current.id;

    let saved = state.policy.save_admin_configuration(config).await?;
    tracing::info!(admin = %claims.user_id, "Admin configuration updated");

    serde_yaml::to_string(&saved)
        .map_err(|e| Error::Internal(anyhow::anyhow!("serialize admin config: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminJobsQuery {
    pub lob: Option<String>,
    pub team: Option<String>,
    pub job: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub page_size: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminJobsResponse {
    pub jobs: Vec<TestJob>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
}

pub async fn get_jobs(
    State(state): State<AppState>,
    _claims: AdminClaims,
    Query(query): Query<AdminJobsQuery>,
) -> Result<Json<AdminJobsResponse>> {
    let filter = JobsFilter {
        lob_id: query.lob,
        team_id: query.team,
        job_id: query.job,
        start: query.start,
        end: query.end,
        status: query.status,
    };

    let mut conn = state.pool.get().await?;
    let jobs = reporting::get_jobs(&mut conn, &filter, query.page_size, query.page).await?;
    let total_count = reporting::get_jobs_count(&mut conn, &filter).await?;
    let (page_size, _) = reporting::page_bounds(query.page_size, query.page);

    Ok(Json(AdminJobsResponse {
        jobs,
        total_count,
        page: query.page.unwrap_or(1).max(1),
        page_size,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub lob: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

pub async fn get_jobs_summary(
    State(state): State<AppState>,
    _claims: AdminClaims,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<ExecutionSummary>> {
    let mut conn = state.pool.get().await?;
    let summary = reporting::get_execution_summary(
        &mut conn,
        query.lob.as_deref(),
        query.start,
        query.end,
    )
    .await?;
    Ok(Json(summary))
}

pub async fn get_lobs_summary(
    State(state): State<AppState>,
    _claims: AdminClaims,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<LobExecutionSummary>>> {
    let mut conn = state.pool.get().await?;
    let rows = reporting::get_lob_execution_summary(&mut conn, query.start, query.end).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailingTestsQuery {
    pub lob: Option<String>,
    pub team: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

pub async fn get_failing_tests(
    State(state): State<AppState>,
    _claims: AdminClaims,
    Query(query): Query<FailingTestsQuery>,
) -> Result<Json<Vec<FailingTest>>> {
    let mut conn = state.pool.get().await?;
    let rows = reporting::get_top_failing_tests(
        &mut conn,
        query.lob.as_deref(),
        query.team.as_deref(),
        query.start,
        query.end,
        query.limit.unwrap_or(10),
    )
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAlertBody {
    pub title: Option<String>,
    pub message: Option<String>,
    pub severity: Option<AlertSeverity>,
}

#[derive(Debug, Serialize)]
pub struct TestAlertResponse {
    pub message: String,
}

pub async fn send_test_alert(
    State(state): State<AppState>,
    claims: AdminClaims,
    Json(body): Json<TestAlertBody>,
) -> Result<Json<TestAlertResponse>> {
    let admin = state.policy.get_admin_configuration(true).await?;
    let title = body.title.unwrap_or_else(|| "Test notification".to_string());
    let message = body
        .message
        .unwrap_or_else(|| format!("Manual test notification requested by {}", claims.user_id));
    let severity = body.severity.unwrap_or(AlertSeverity::Information);

    state
        .notifier
        .send(
            &admin.alerts.notifications,
            &title,
            &message,
            severity,
            &Default::default(),
        )
        .await;

    Ok(Json(TestAlertResponse {
        message: "Test notification dispatched".to_string(),
    }))
}
