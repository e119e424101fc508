//! A test job — one invocation of a runner image against one repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::test_jobs;

/// Lifecycle status of a test job. Created `Running`, transitions to a
/// terminal state exactly once on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "Running",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Running" => Some(JobStatus::Running),
            "Succeeded" => Some(JobStatus::Succeeded),
            "Failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = test_jobs)]
pub struct TestJob {
    pub id: Uuid,
    pub lob_id: String,
    pub team_id: String,
    pub repo_url: String,
    pub test_image_type: String,
    pub branch: String,
    pub status: String,
    pub cluster_job_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub tests_passed: i32,
    pub tests_failed: i32,
    pub tests_skipped: i32,
    pub created_by: String,
    pub schedule_id: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = test_jobs)]
pub struct NewTestJob {
    pub id: Uuid,
    pub lob_id: String,
    pub team_id: String,
    pub repo_url: String,
    pub test_image_type: String,
    pub branch: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub created_by: String,
    pub schedule_id: Option<Uuid>,
}

/// A validated request to run a repository's test suite.
///
/// `lob_id` / `team_id` / `user_id` are server-derived from auth claims,
/// never from the client body.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub repo_url: String,
    pub test_image_type: String,
    pub lob_id: String,
    pub team_id: String,
    pub user_id: String,
    pub schedule_id: Option<Uuid>,
    /// Overrides the admin default workload deadline when set.
    pub timeout_minutes: Option<i64>,
    pub branch: String,
    /// Passed to the runner to restrict which tests execute.
    pub test_filter: Option<String>,
}

impl JobRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.repo_url.trim().is_empty() {
            return Err("repoUrl must not be empty".to_string());
        }
        if self.test_image_type.trim().is_empty() {
            return Err("testImageType must not be empty".to_string());
        }
        if self.lob_id.is_empty() || self.team_id.is_empty() {
            return Err("missing tenancy claims".to_string());
        }
        if let Some(minutes) = self.timeout_minutes {
            if minutes <= 0 {
                return Err("timeoutMinutes must be positive".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_column_text() {
        for status in [JobStatus::Running, JobStatus::Succeeded, JobStatus::Failed] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("Pending"), None);
    }

    #[test]
    fn request_validation_rejects_empty_fields() {
        let mut req = JobRequest {
            repo_url: "https://example/r.git".to_string(),
            test_image_type: "DotNet".to_string(),
            lob_id: "acme".to_string(),
            team_id: "pay".to_string(),
            user_id: "u1".to_string(),
            schedule_id: None,
            timeout_minutes: None,
            branch: "main".to_string(),
            test_filter: None,
        };
        assert!(req.validate().is_ok());

        req.timeout_minutes = Some(0);
        assert!(req.validate().is_err());

        req.timeout_minutes = Some(30);
        req.repo_url = "  ".to_string();
        assert!(req.validate().is_err());
    }
}
