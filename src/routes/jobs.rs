//! Job submission, status, results, and cleanup handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::job::{JobRequest, JobStatus, TestJob};
use crate::routes::auth::TenantClaims;
use crate::routes::AppState;
use crate::services::storage::artifact_key;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobBody {
    pub repo_url: String,
    pub test_image_type: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub timeout_minutes: Option<i64>,
    #[serde(default)]
    pub test_filter: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub message: String,
}

pub async fn create_job(
    State(state): State<AppState>,
    claims: TenantClaims,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<CreateJobResponse>)> {
    let request = JobRequest {
        repo_url: body.repo_url,
        test_image_type: body.test_image_type,
        lob_id: claims.lob_id,
        team_id: claims.team_id,
        user_id: claims.user_id,
        schedule_id: None,
        timeout_minutes: body.timeout_minutes,
        branch: body.branch.unwrap_or_else(|| "main".to_string()),
        test_filter: body.test_filter,
    };
    request.validate().map_err(Error::InvalidRequest)?;

    let job_id = state.tracker.create_job(&request).await?;

    let cluster_job_name = match state.orchestrator.create_test_job(&request).await {
        Ok(name) => name,
        Err(e) => {
            // Submission failed after the row was created; record the failure.
            if let Err(update_err) = state
                .tracker
                .update_job_status(job_id, JobStatus::Failed)
                .await
            {
                tracing::error!(job_id = %job_id, "Failed to mark job failed: {update_err}");
            }
            return Err(e);
        }
    };

    state
        .tracker
        .set_cluster_job_name(job_id, &cluster_job_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            job_id,
            message: format!("Test job created and running: {cluster_job_name}"),
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: String,
}

/// Load the job row and hide cross-tenant rows behind 404.
async fn owned_job(state: &AppState, job_id: Uuid, lob_id: &str) -> Result<TestJob> {
    let job = state.tracker.get_job(job_id).await?;
    if job.lob_id != lob_id {
        return Err(Error::JobNotFound(job_id));
    }
    Ok(job)
}

pub async fn get_job_status(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>> {
    let job = owned_job(&state, job_id, &claims.lob_id).await?;

    // Runtime state belongs to the cluster; re-derive it per call.
    let mut status = job.status.clone();
    if job.status == JobStatus::Running.as_str() {
        if let Some(cluster_job_name) = &job.cluster_job_name {
            match state.orchestrator.get_job(cluster_job_name, &job.lob_id).await {
                Ok(info) if info.is_terminal() => {
                    status = if info.has_failed() {
                        JobStatus::Failed.as_str().to_string()
                    } else {
                        JobStatus::Succeeded.as_str().to_string()
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job_id, "Cluster status probe failed: {e}");
                }
            }
        }
    }

    Ok(Json(JobStatusResponse { job_id, status }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultsResponse {
    pub job_id: Uuid,
    pub status: String,
    pub results: Option<String>,
}

/// Results retrieval doubles as the completion hook: the first call that
/// observes a terminal workload ingests its report.
pub async fn get_job_results(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResultsResponse>> {
    let job = owned_job(&state, job_id, &claims.lob_id).await?;

    if job.status != JobStatus::Running.as_str() {
        // Already ingested; serve the stored artifact.
        let key = artifact_key(&job.lob_id, &job.team_id, &job.id, "test-results.xml");
        let stored = state
            .storage
            .get(&key)
            .await
            .ok()
            .flatten()
            .and_then(|bytes| String::from_utf8(bytes).ok());
        return Ok(Json(JobResultsResponse {
            job_id,
            status: job.status,
            results: stored,
        }));
    }

    let Some(cluster_job_name) = job.cluster_job_name.clone() else {
        return Ok(Json(JobResultsResponse {
            job_id,
            status: job.status,
            results: None,
        }));
    };

    let info = state
        .orchestrator
        .get_job(&cluster_job_name, &job.lob_id)
        .await?;
    if !info.is_terminal() {
        return Ok(Json(JobResultsResponse {
            job_id,
            status: JobStatus::Running.as_str().to_string(),
            results: None,
        }));
    }

    let logs = state
        .orchestrator
        .get_test_results(&cluster_job_name, &job.lob_id)
        .await?;
    let status = if info.has_failed() {
        JobStatus::Failed
    } else {
        JobStatus::Succeeded
    };

    let summary = state
        .tracker
        .complete_job(job_id, status, &logs, Some(logs.as_bytes()))
        .await?;

    Ok(Json(JobResultsResponse {
        job_id,
        status: summary.status.as_str().to_string(),
        results: Some(logs),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub job_id: Uuid,
    pub message: String,
}

pub async fn cleanup_job(
    State(state): State<AppState>,
    claims: TenantClaims,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CleanupResponse>> {
    let job = owned_job(&state, job_id, &claims.lob_id).await?;

    let Some(cluster_job_name) = job.cluster_job_name else {
        return Err(Error::invalid("job has no cluster workload to clean up"));
    };

    state
        .orchestrator
        .cleanup_test_job(&cluster_job_name, &job.lob_id)
        .await?;

    Ok(Json(CleanupResponse {
        job_id,
        message: format!("Cleanup completed for {cluster_job_name}"),
    }))
}
