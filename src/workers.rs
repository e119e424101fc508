//! Background workers — ticker loops spawned as tokio tasks.
//!
//! Each tick's work is bounded by a deadline of half the tick period;
//! cancellation stops a loop at the next await point.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cluster::ClusterBackend;
use crate::db::PgPool;
use crate::error::Result;
use crate::models::alert::AlertSeverity;
use crate::schema::{test_jobs, test_results};
use crate::services::cleanup::CleanupRequest;
use crate::services::monitor::MonitorService;
use crate::services::notify::NotificationSender;
use crate::services::orchestrator::JobOrchestrator;
use crate::services::policy::PolicyStore;
use crate::services::schedule::ScheduleEngine;
use crate::services::storage::BlobStore;

pub const SCHEDULE_TICK: Duration = Duration::from_secs(5 * 60);
pub const METRICS_TICK: Duration = Duration::from_secs(5 * 60);
pub const JOB_CLEANUP_TICK: Duration = Duration::from_secs(4 * 60 * 60);

/// Evaluate due schedules every five minutes.
pub async fn run_schedule_ticker(engine: Arc<ScheduleEngine>, cancel: CancellationToken) {
    tracing::info!("Schedule ticker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(SCHEDULE_TICK) => {}
        }

        match timeout(SCHEDULE_TICK / 2, engine.process_due_schedules(Utc::now())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!("Schedule tick failed: {e}"),
            Err(_) => tracing::error!("Schedule tick exceeded its deadline"),
        }
    }
    tracing::info!("Schedule ticker stopped");
}

/// Collect cluster metrics every five minutes.
pub async fn run_metrics_ticker(monitor: Arc<MonitorService>, cancel: CancellationToken) {
    tracing::info!("Metrics ticker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(METRICS_TICK) => {}
        }

        match timeout(METRICS_TICK / 2, monitor.collect_cluster_metrics()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Metric collection failed: {e}"),
            Err(_) => tracing::error!("Metric collection exceeded its deadline"),
        }
    }
    tracing::info!("Metrics ticker stopped");
}

/// Delete aged completed workloads every four hours, when auto-cleanup
/// is enabled by policy.
pub async fn run_job_cleanup_ticker(
    cluster: Arc<dyn ClusterBackend>,
    policy: Arc<PolicyStore>,
    cancel: CancellationToken,
) {
    tracing::info!("Job cleanup ticker started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(JOB_CLEANUP_TICK) => {}
        }

        let work = cleanup_completed_jobs(&cluster, &policy);
        match timeout(JOB_CLEANUP_TICK / 2, work).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("Job cleanup failed: {e}"),
            Err(_) => tracing::error!("Job cleanup exceeded its deadline"),
        }
    }
    tracing::info!("Job cleanup ticker stopped");
}

async fn cleanup_completed_jobs(
    cluster: &Arc<dyn ClusterBackend>,
    policy: &Arc<PolicyStore>,
) -> Result<()> {
    let admin = policy.get_admin_configuration(true).await?;
    if !admin.resource_management.auto_cleanup_jobs {
        tracing::debug!("Auto cleanup disabled by policy, skipping");
        return Ok(());
    }

    let cutoff = Utc::now() - ChronoDuration::hours(admin.resource_management.cleanup_after_hours);
    let prefix = &admin.cluster.lob_namespace_prefix;

    for namespace in cluster.list_namespaces(Some(prefix)).await? {
        match cluster.cleanup_completed_jobs(&namespace, cutoff).await {
            Ok(deleted) if deleted > 0 => {
                crate::metrics::jobs_cleaned(&namespace, deleted as u64);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(namespace, "Namespace cleanup failed: {e}"),
        }
    }
    Ok(())
}

/// Prune aged test results, artifacts, and job history daily at 00:00 UTC.
pub async fn run_retention_ticker(
    pool: PgPool,
    storage: Arc<dyn BlobStore>,
    policy: Arc<PolicyStore>,
    cancel: CancellationToken,
) {
    tracing::info!("Retention ticker started");
    loop {
        let wait = duration_until_next_utc(0, 0, Utc::now());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        match timeout(
            Duration::from_secs(60 * 60),
            prune_old_data(&pool, &storage, &policy),
        )
        .await
        {
            Ok(Ok((results, jobs))) => {
                tracing::info!(results, jobs, "Retention pass completed");
            }
            Ok(Err(e)) => tracing::error!("Retention pass failed: {e}"),
            Err(_) => tracing::error!("Retention pass exceeded its deadline"),
        }
    }
    tracing::info!("Retention ticker stopped");
}

async fn prune_old_data(
    pool: &PgPool,
    storage: &Arc<dyn BlobStore>,
    policy: &Arc<PolicyStore>,
) -> Result<(usize, usize)> {
    let admin = policy.get_admin_configuration(true).await?;
    let now = Utc::now();
    let results_cutoff =
        now - ChronoDuration::days(admin.retention.test_results_retention_days);
    let history_cutoff =
        now - ChronoDuration::days(admin.retention.job_history_retention_days);

    let mut conn = pool.get().await?;

    // Results and artifacts age out first.
    let aged: Vec<(Uuid, String, String)> = test_jobs::table
        .filter(test_jobs::start_time.lt(results_cutoff))
        .select((test_jobs::id, test_jobs::lob_id, test_jobs::team_id))
        .load(&mut conn)
        .await?;

    for (job_id, lob_id, team_id) in &aged {
        let prefix = format!("{lob_id}/{team_id}/{job_id}/");
        match storage.list(&prefix).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = storage.delete(&key).await {
                        tracing::warn!(key, "Artifact delete failed: {e}");
                    }
                }
            }
            Err(e) => tracing::warn!(prefix, "Artifact listing failed: {e}"),
        }
    }

    let aged_ids: Vec<Uuid> = aged.iter().map(|(id, _, _)| *id).collect();
    let results_deleted = if aged_ids.is_empty() {
        0
    } else {
        diesel::delete(test_results::table.filter(test_results::job_id.eq_any(&aged_ids)))
            .execute(&mut conn)
            .await?
    };

    // Job rows survive until the longer history window lapses.
    let history_ids: Vec<Uuid> = test_jobs::table
        .filter(test_jobs::start_time.lt(history_cutoff))
        .select(test_jobs::id)
        .load(&mut conn)
        .await?;

    let jobs_deleted = if history_ids.is_empty() {
        0
    } else {
        diesel::delete(test_results::table.filter(test_results::job_id.eq_any(&history_ids)))
            .execute(&mut conn)
            .await?;
        diesel::delete(test_jobs::table.filter(test_jobs::id.eq_any(&history_ids)))
            .execute(&mut conn)
            .await?
    };

    Ok((results_deleted, jobs_deleted))
}

/// Daily smoke-test notification at 08:00 UTC, proving the alert path.
pub async fn run_notification_ticker(
    policy: Arc<PolicyStore>,
    notifier: Arc<dyn NotificationSender>,
    cancel: CancellationToken,
) {
    tracing::info!("Notification ticker started");
    loop {
        let wait = duration_until_next_utc(8, 0, Utc::now());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        match policy.get_admin_configuration(true).await {
            Ok(admin) => {
                notifier
                    .send(
                        &admin.alerts.notifications,
                        "Daily notification check",
                        "The notification delivery path is operational.",
                        AlertSeverity::Information,
                        &Default::default(),
                    )
                    .await;
            }
            Err(e) => tracing::warn!("Daily notification skipped: {e}"),
        }
    }
    tracing::info!("Notification ticker stopped");
}

/// Drain workload teardown requests enqueued at job completion.
pub async fn run_cleanup_queue_worker(
    mut rx: mpsc::UnboundedReceiver<CleanupRequest>,
    orchestrator: Arc<JobOrchestrator>,
    cancel: CancellationToken,
) {
    tracing::info!("Cleanup queue worker started");
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        if let Err(e) = orchestrator
            .cleanup_test_job(&request.job_name, &request.lob_id)
            .await
        {
            // Retry, if any, is the queue owner's concern.
            tracing::warn!(
                job = %request.job_name,
                lob = %request.lob_id,
                "Workload cleanup failed: {e}"
            );
        }
    }
    tracing::info!("Cleanup queue worker stopped");
}

/// Time until the next `hour:minute` UTC, always in the future.
pub fn duration_until_next_utc(hour: u32, minute: u32, now: DateTime<Utc>) -> Duration {
    let Some(today_naive) = now.date_naive().and_hms_opt(hour, minute, 0) else {
        return Duration::from_secs(24 * 60 * 60);
    };
    let today_target = today_naive.and_utc();

    let target = if today_target > now {
        today_target
    } else {
        today_target + ChronoDuration::days(1)
    };

    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_utc_occurrence_rolls_over_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 23, 30, 0).unwrap();
        let wait = duration_until_next_utc(0, 0, now);
        assert_eq!(wait, Duration::from_secs(30 * 60));
    }

    #[test]
    fn next_utc_occurrence_same_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap();
        let wait = duration_until_next_utc(8, 0, now);
        assert_eq!(wait, Duration::from_secs(2 * 60 * 60));
    }

    #[test]
    fn exact_target_time_waits_a_full_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let wait = duration_until_next_utc(8, 0, now);
        assert_eq!(wait, Duration::from_secs(24 * 60 * 60));
    }
}
