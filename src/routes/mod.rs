//! Platform HTTP routes.

pub mod admin;
pub mod auth;
pub mod configurations;
pub mod health;
pub mod jobs;
pub mod schedules;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::cluster::namespace::NamespaceResolver;
use crate::db::PgPool;
use crate::services::notify::NotificationSender;
use crate::services::orchestrator::JobOrchestrator;
use crate::services::policy::PolicyStore;
use crate::services::storage::BlobStore;
use crate::services::tracker::JobTracker;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub policy: Arc<PolicyStore>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub tracker: Arc<JobTracker>,
    pub resolver: Arc<NamespaceResolver>,
    pub storage: Arc<dyn BlobStore>,
    pub notifier: Arc<dyn NotificationSender>,
}

/// Build the platform's Axum router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Jobs
        .route("/jobs", post(jobs::create_job))
        .route("/jobs/{job_id}", get(jobs::get_job_status))
        .route("/jobs/{job_id}/results", get(jobs::get_job_results))
        .route("/jobs/{job_id}/cleanup", post(jobs::cleanup_job))
        // Schedules
        .route(
            "/schedules",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route(
            "/schedules/{id}",
            get(schedules::get_schedule)
                .put(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        // User configurations
        .route(
            "/configurations",
            get(configurations::list_configurations).post(configurations::create_configuration),
        )
        .route(
            "/configurations/{id}",
            get(configurations::get_configuration)
                .put(configurations::update_configuration)
                .delete(configurations::delete_configuration),
        )
        // Admin
        .route(
            "/admin/configuration",
            get(admin::get_admin_configuration).put(admin::put_admin_configuration),
        )
        .route("/admin/jobs", get(admin::get_jobs))
        .route("/admin/jobs/summary", get(admin::get_jobs_summary))
        .route("/admin/lobs/summary", get(admin::get_lobs_summary))
        .route("/admin/tests/failing", get(admin::get_failing_tests))
        .route("/admin/alerts/test", post(admin::send_test_alert))
        // Health
        .route("/health", get(health::health))
        .with_state(state)
}
