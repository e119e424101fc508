//! Cluster abstraction — a polymorphic backend over the container
//! orchestrator. The rest of the system sees only this interface; backend
//! client types never cross the boundary.

pub mod kube_backend;
pub mod namespace;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ClusterError;

/// A one-shot test workload to be created on the cluster.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub job_name: String,
    pub namespace: String,
    pub image: String,
    pub repo_url: String,
    /// Extra environment on top of `REPO_URL`.
    pub env: Vec<(String, String)>,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,
    pub active_deadline_seconds: i64,
    pub lob_id: String,
}

/// Workload state as reported by the cluster.
#[derive(Debug, Clone, Default)]
pub struct JobInfo {
    pub name: String,
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub completion_time: Option<DateTime<Utc>>,
}

impl JobInfo {
    /// Terminal means at least one pod succeeded or at least one failed.
    pub fn is_terminal(&self) -> bool {
        self.succeeded >= 1 || self.failed >= 1
    }

    pub fn has_failed(&self) -> bool {
        self.failed >= 1
    }
}

#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    /// Pod phase as reported: Running | Pending | Succeeded | Failed | Unknown.
    pub phase: String,
}

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub ready: bool,
}

/// Capability set of the container orchestrator.
///
/// Errors carry the `ClusterError` taxonomy; callers may match `NotFound`
/// to implement idempotent create.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Create a one-shot workload running the test container. Returns the
    /// workload name.
    async fn create_test_job(&self, spec: &WorkloadSpec) -> Result<String, ClusterError>;

    /// Read current workload state.
    async fn get_job(&self, job_name: &str, namespace: &str) -> Result<JobInfo, ClusterError>;

    /// True iff the workload reached a terminal state (succeeded or failed).
    async fn is_job_completed(&self, job_name: &str, namespace: &str)
        -> Result<bool, ClusterError>;

    /// Full log stream of the first pod labeled `job-name=<job_name>`.
    /// Returns a sentinel message when no pod exists; never fails for that.
    async fn get_job_logs(&self, job_name: &str, namespace: &str) -> Result<String, ClusterError>;

    /// Delete the workload, cascading to its pods in the background.
    async fn delete_job(&self, job_name: &str, namespace: &str) -> Result<(), ClusterError>;

    /// Idempotent namespace creation.
    async fn create_namespace_if_not_exists(&self, name: &str) -> Result<(), ClusterError>;

    async fn list_namespaces(&self, prefix: Option<&str>) -> Result<Vec<String>, ClusterError>;

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<PodInfo>, ClusterError>;

    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<JobInfo>, ClusterError>;

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterError>;

    /// Delete terminal workloads whose completion is older than the cutoff.
    /// Returns the number of deleted workloads.
    async fn cleanup_completed_jobs(
        &self,
        namespace: &str,
        older_than: DateTime<Utc>,
    ) -> Result<u32, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_counts_either_outcome() {
        let mut info = JobInfo {
            name: "test-job-abc".to_string(),
            ..Default::default()
        };
        assert!(!info.is_terminal());

        info.succeeded = 1;
        assert!(info.is_terminal());

        info.succeeded = 0;
        info.failed = 1;
        assert!(info.is_terminal());
        assert!(info.has_failed());
    }
}
