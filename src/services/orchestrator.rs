//! Job orchestration — translates a validated request into a cluster
//! workload and answers lifecycle queries against the cluster.
//!
//! The orchestrator never touches the database; persisting lifecycle state
//! is the tracker's job at the caller.

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;

use crate::cluster::namespace::NamespaceResolver;
use crate::cluster::{ClusterBackend, JobInfo, WorkloadSpec};
use crate::error::Result;
use crate::models::job::JobRequest;
use crate::services::policy::PolicyStore;

pub struct JobOrchestrator {
    cluster: Arc<dyn ClusterBackend>,
    namespaces: Arc<NamespaceResolver>,
    policy: Arc<PolicyStore>,
    container_registry: String,
}

impl JobOrchestrator {
    pub fn new(
        cluster: Arc<dyn ClusterBackend>,
        namespaces: Arc<NamespaceResolver>,
        policy: Arc<PolicyStore>,
        container_registry: String,
    ) -> Self {
        Self {
            cluster,
            namespaces,
            policy,
            container_registry,
        }
    }

    /// Submit a test workload for the LOB. Returns the cluster job name.
    pub async fn create_test_job(&self, request: &JobRequest) -> Result<String> {
        let started = Instant::now();
        let lob_id = request.lob_id.as_str();
        let test_image_type = request.test_image_type.as_str();
        let namespace = self.namespaces.ensure_namespace_exists(lob_id).await?;

        let admin = self.policy.get_admin_configuration(true).await?;
        let limits = &admin.resource_management.default_container_limits;

        let image = format!(
            "{}/{}:latest",
            self.container_registry,
            test_image_type.to_lowercase()
        );
        let job_name = format!("test-job-{}", random_hex_suffix());

        let mut env = vec![("BRANCH".to_string(), request.branch.clone())];
        if let Some(filter) = &request.test_filter {
            env.push(("TEST_FILTER".to_string(), filter.clone()));
        }

        let timeout_minutes = request
            .timeout_minutes
            .unwrap_or(admin.resource_management.default_job_timeout_minutes);

        let spec = WorkloadSpec {
            job_name: job_name.clone(),
            namespace: namespace.clone(),
            image: image.clone(),
            repo_url: request.repo_url.clone(),
            env,
            cpu_limit: limits.cpu_limit.clone(),
            memory_limit: limits.memory_limit.clone(),
            cpu_request: limits.cpu_request.clone(),
            memory_request: limits.memory_request.clone(),
            active_deadline_seconds: timeout_minutes * 60,
            lob_id: lob_id.to_string(),
        };

        match self.cluster.create_test_job(&spec).await {
            Ok(name) => {
                crate::metrics::test_job_created(&namespace, test_image_type, lob_id);
                crate::metrics::job_submit_duration(started.elapsed().as_millis() as u64);
                tracing::info!(
                    job_name = %name,
                    namespace = %namespace,
                    image_type = test_image_type,
                    lob = lob_id,
                    "Test job submitted"
                );
                Ok(name)
            }
            Err(e) => {
                tracing::error!(
                    namespace = %namespace,
                    image_type = test_image_type,
                    lob = lob_id,
                    "Test job submission failed: {e}"
                );
                Err(e.into())
            }
        }
    }

    pub async fn get_job(&self, job_name: &str, lob_id: &str) -> Result<JobInfo> {
        let namespace = self.namespaces.namespace_for_lob(lob_id).await;
        Ok(self.cluster.get_job(job_name, &namespace).await?)
    }

    pub async fn is_job_completed(&self, job_name: &str, lob_id: &str) -> Result<bool> {
        let namespace = self.namespaces.namespace_for_lob(lob_id).await;
        Ok(self.cluster.is_job_completed(job_name, &namespace).await?)
    }

    /// Fetch the runner's output (the test report plus surrounding log).
    pub async fn get_test_results(&self, job_name: &str, lob_id: &str) -> Result<String> {
        let namespace = self.namespaces.namespace_for_lob(lob_id).await;
        Ok(self.cluster.get_job_logs(job_name, &namespace).await?)
    }

    pub async fn cleanup_test_job(&self, job_name: &str, lob_id: &str) -> Result<()> {
        let namespace = self.namespaces.namespace_for_lob(lob_id).await;
        Ok(self.cluster.delete_job(job_name, &namespace).await?)
    }
}

/// 32 hex characters, lowercase.
fn random_hex_suffix() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| HEX[rng.gen_range(0..16)] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_suffix_is_32_hex_chars() {
        let suffix = random_hex_suffix();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random_hex_suffix(), random_hex_suffix());
    }
}
