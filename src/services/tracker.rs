//! Job lifecycle tracking — persistence of state transitions, result
//! ingestion, artifact upload, event publication, and metrics.

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::models::job::{JobRequest, JobStatus, NewTestJob, TestJob};
use crate::models::test_result::NewTestResult;
use crate::schema::{test_jobs, test_results};
use crate::services::alert::AlertEngine;
use crate::services::cleanup::{CleanupQueue, CleanupRequest};
use crate::services::messaging::{ResultPublisher, TestResultMetadataMessage};
use crate::services::policy::PolicyStore;
use crate::services::report::{self, ParsedReport};
use crate::services::storage::{artifact_key, BlobStore};

/// Outcome of a completion call.
#[derive(Debug, Clone)]
pub struct CompletionSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub tests_passed: i32,
    pub tests_failed: i32,
    pub tests_skipped: i32,
    pub duration_seconds: f64,
    /// True when the job was already terminal and nothing was changed.
    pub already_completed: bool,
}

pub struct JobTracker {
    pool: PgPool,
    policy: Arc<PolicyStore>,
    storage: Arc<dyn BlobStore>,
    publisher: Arc<dyn ResultPublisher>,
    alerts: Arc<AlertEngine>,
    cleanup: Arc<dyn CleanupQueue>,
}

impl JobTracker {
    pub fn new(
        pool: PgPool,
        policy: Arc<PolicyStore>,
        storage: Arc<dyn BlobStore>,
        publisher: Arc<dyn ResultPublisher>,
        alerts: Arc<AlertEngine>,
        cleanup: Arc<dyn CleanupQueue>,
    ) -> Self {
        Self {
            pool,
            policy,
            storage,
            publisher,
            alerts,
            cleanup,
        }
    }

    /// Persist a new Running job. Enforces the admin concurrency caps at
    /// submission time.
    pub async fn create_job(&self, request: &JobRequest) -> Result<Uuid> {
        let admin = self.policy.get_admin_configuration(true).await?;
        let caps = &admin.resource_management;

        let mut conn = self.pool.get().await?;

        let lob_running = self.count_running_for_lob(&mut conn, &request.lob_id).await?;
        if lob_running >= caps.max_concurrent_jobs_per_lob as i64 {
            return Err(Error::QuotaExceeded {
                scope: format!("lob {}", request.lob_id),
                running: lob_running,
                limit: caps.max_concurrent_jobs_per_lob,
            });
        }

        let team_running = self
            .count_running_for_team(&mut conn, &request.lob_id, &request.team_id)
            .await?;
        if team_running >= caps.max_concurrent_jobs_per_team as i64 {
            return Err(Error::QuotaExceeded {
                scope: format!("team {}", request.team_id),
                running: team_running,
                limit: caps.max_concurrent_jobs_per_team,
            });
        }

        let job_id = Uuid::new_v4();
        let row = NewTestJob {
            id: job_id,
            lob_id: request.lob_id.clone(),
            team_id: request.team_id.clone(),
            repo_url: request.repo_url.clone(),
            test_image_type: request.test_image_type.clone(),
            branch: request.branch.clone(),
            status: JobStatus::Running.as_str().to_string(),
            start_time: Utc::now(),
            created_by: request.user_id.clone(),
            schedule_id: request.schedule_id,
        };

        diesel::insert_into(test_jobs::table)
            .values(&row)
            .execute(&mut conn)
            .await?;

        crate::metrics::job_status_changed(JobStatus::Running.as_str());
        tracing::info!(
            job_id = %job_id,
            lob = %request.lob_id,
            team = %request.team_id,
            repo = %request.repo_url,
            "Job created"
        );

        Ok(job_id)
    }

    /// Record the cluster workload name once submission succeeded.
    pub async fn set_cluster_job_name(&self, job_id: Uuid, cluster_job_name: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(test_jobs::table.find(job_id))
            .set(test_jobs::cluster_job_name.eq(cluster_job_name))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Non-terminal status update, exposed for external lifecycle signals.
    pub async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(test_jobs::table.find(job_id))
            .set(test_jobs::status.eq(status.as_str()))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(Error::JobNotFound(job_id));
        }
        crate::metrics::job_status_changed(status.as_str());
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<TestJob> {
        let mut conn = self.pool.get().await?;
        let job: Option<TestJob> = test_jobs::table
            .find(job_id)
            .first(&mut conn)
            .await
            .optional()?;
        job.ok_or(Error::JobNotFound(job_id))
    }

    /// Complete a job: parse the report, transition the row and insert the
    /// result children in one transaction, then run the ordered best-effort
    /// side effects (artifact upload, telemetry, event publication).
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        results_xml: &str,
        artifact: Option<&[u8]>,
    ) -> Result<CompletionSummary> {
        let report = report::parse_test_results(results_xml);
        let end_time = Utc::now();

        let new_results: Vec<NewTestResult> = report
            .tests
            .iter()
            .map(|t| NewTestResult {
                id: Uuid::new_v4(),
                job_id,
                test_name: t.name.clone(),
                status: t.status.as_str().to_string(),
                duration_seconds: t.duration_seconds,
                error_message: t.error_message.clone(),
                stack_trace: t.stack_trace.clone(),
            })
            .collect();

        // Unknown outcomes count as skipped so the three persisted counters
        // always sum to the number of result rows.
        let (passed, failed, skipped) = (
            report.passed(),
            report.failed(),
            report.skipped() + report.unknown(),
        );

        let mut conn = self.pool.get().await?;
        let (job, already_completed): (TestJob, bool) = conn
            .transaction::<_, Error, _>(|conn| {
                async move {
                    let job: Option<TestJob> = test_jobs::table
                        .find(job_id)
                        .first(conn)
                        .await
                        .optional()?;
                    let job = job.ok_or(Error::JobNotFound(job_id))?;

                    // Terminal transition happens exactly once; a second
                    // completion call is a no-op.
                    if JobStatus::parse(&job.status).map_or(false, |s| s.is_terminal()) {
                        return Ok((job, true));
                    }

                    let job: TestJob = diesel::update(test_jobs::table.find(job_id))
                        .set((
                            test_jobs::status.eq(status.as_str()),
                            test_jobs::end_time.eq(end_time),
                            test_jobs::tests_passed.eq(passed),
                            test_jobs::tests_failed.eq(failed),
                            test_jobs::tests_skipped.eq(skipped),
                        ))
                        .get_result(conn)
                        .await?;

                    if !new_results.is_empty() {
                        diesel::insert_into(test_results::table)
                            .values(&new_results)
                            .execute(conn)
                            .await?;
                    }

                    Ok((job, false))
                }
                .scope_boxed()
            })
            .await?;

        if already_completed {
            tracing::info!(job_id = %job_id, "Job already completed, skipping side effects");
            let stored_end = job.end_time.unwrap_or(end_time);
            return Ok(CompletionSummary {
                job_id,
                status: JobStatus::parse(&job.status).unwrap_or(status),
                tests_passed: job.tests_passed,
                tests_failed: job.tests_failed,
                tests_skipped: job.tests_skipped,
                duration_seconds: (stored_end - job.start_time).num_milliseconds() as f64
                    / 1000.0,
                already_completed: true,
            });
        }

        let duration_seconds = (end_time - job.start_time).num_milliseconds() as f64 / 1000.0;

        crate::metrics::job_status_changed(status.as_str());

        let side_effect_error = self
            .run_post_commit_effects(&job, status, &report, artifact, duration_seconds, end_time)
            .await;

        if let Some(cluster_job_name) = &job.cluster_job_name {
            let enqueue = self
                .cleanup
                .enqueue(CleanupRequest {
                    job_name: cluster_job_name.clone(),
                    lob_id: job.lob_id.clone(),
                })
                .await;
            if let Err(e) = enqueue {
                tracing::warn!(job_id = %job_id, "Cleanup enqueue failed: {e}");
            }
        }

        if let Some(err) = side_effect_error {
            return Err(err);
        }

        Ok(CompletionSummary {
            job_id,
            status,
            tests_passed: passed,
            tests_failed: failed,
            tests_skipped: skipped,
            duration_seconds,
            already_completed: false,
        })
    }

    /// Ordered best-effort effects after commit. Only the artifact size
    /// gate produces a caller-visible error; everything else is logged.
    async fn run_post_commit_effects(
        &self,
        job: &TestJob,
        status: JobStatus,
        report: &ParsedReport,
        artifact: Option<&[u8]>,
        duration_seconds: f64,
        now: chrono::DateTime<Utc>,
    ) -> Option<Error> {
        let mut size_error = None;

        // 1. Artifact upload.
        if let Some(bytes) = artifact.filter(|b| !b.is_empty()) {
            match self.upload_artifacts(job, status, report, bytes).await {
                Ok(()) => {}
                Err(e @ Error::InvalidRequest(_)) => size_error = Some(e),
                Err(e) => tracing::warn!(job_id = %job.id, "Artifact upload failed: {e}"),
            }
        }

        // 2. Telemetry and alert evaluation.
        let (passed, failed, skipped) = (
            report.passed(),
            report.failed(),
            report.skipped() + report.unknown(),
        );
        crate::metrics::test_execution(duration_seconds, passed, failed, skipped);

        let total = passed + failed + skipped;
        let fail_rate = if total > 0 {
            failed as f64 * 100.0 / total as f64
        } else {
            0.0
        };

        let dims = std::collections::BTreeMap::from([
            ("lob".to_string(), job.lob_id.clone()),
            ("team".to_string(), job.team_id.clone()),
        ]);
        self.alerts
            .evaluate("TestExecution.Duration", duration_seconds, &dims, now)
            .await;
        self.alerts
            .evaluate("TestExecution.FailRate", fail_rate, &dims, now)
            .await;
        if status != JobStatus::Succeeded {
            self.alerts
                .evaluate("TestExecution.Failed", 1.0, &dims, now)
                .await;
        }

        // 3. Metadata event.
        let message = TestResultMetadataMessage {
            job_id: job.id,
            lob_id: job.lob_id.clone(),
            team_id: job.team_id.clone(),
            status: status.as_str().to_string(),
            total_tests: total,
            tests_passed: passed,
            tests_failed: failed,
            tests_skipped: skipped,
            duration_seconds,
            completed_at: now,
        };
        if let Err(e) = self
            .publisher
            .publish(&job.id.to_string(), &message)
            .await
        {
            tracing::warn!(job_id = %job.id, "Result metadata publish failed: {e}");
        }

        size_error
    }

    async fn upload_artifacts(
        &self,
        job: &TestJob,
        status: JobStatus,
        report: &ParsedReport,
        bytes: &[u8],
    ) -> Result<()> {
        let admin = self.policy.get_admin_configuration(true).await?;
        let max_bytes =
            admin.retention.max_test_result_file_size_mb as usize * 1024 * 1024;
        if bytes.len() > max_bytes {
            return Err(Error::invalid(format!(
                "test result file size ({} bytes) exceeds maximum allowed ({} MB)",
                bytes.len(),
                admin.retention.max_test_result_file_size_mb
            )));
        }

        let xml_key = artifact_key(&job.lob_id, &job.team_id, &job.id, "test-results.xml");
        self.storage
            .put(&xml_key, bytes)
            .await
            .map_err(Error::Internal)?;

        let log = report::synthesize_full_log(&job.id, status.as_str(), report);
        let log_key = artifact_key(&job.lob_id, &job.team_id, &job.id, "full-log.txt");
        self.storage
            .put(&log_key, log.as_bytes())
            .await
            .map_err(Error::Internal)?;

        tracing::info!(job_id = %job.id, "Artifacts uploaded");
        Ok(())
    }

    pub async fn count_running_for_lob(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        lob_id: &str,
    ) -> Result<i64> {
        let count = test_jobs::table
            .filter(test_jobs::lob_id.eq(lob_id))
            .filter(test_jobs::status.eq(JobStatus::Running.as_str()))
            .count()
            .get_result(conn)
            .await?;
        Ok(count)
    }

    pub async fn count_running_for_team(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        lob_id: &str,
        team_id: &str,
    ) -> Result<i64> {
        let count = test_jobs::table
            .filter(test_jobs::lob_id.eq(lob_id))
            .filter(test_jobs::team_id.eq(team_id))
            .filter(test_jobs::status.eq(JobStatus::Running.as_str()))
            .count()
            .get_result(conn)
            .await?;
        Ok(count)
    }
}
