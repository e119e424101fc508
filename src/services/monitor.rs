//! Periodic cluster metric collection.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::cluster::ClusterBackend;
use crate::error::Result;
use crate::services::alert::AlertEngine;
use crate::services::policy::PolicyStore;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NamespaceCounts {
    pub running_pods: i64,
    pub pending_pods: i64,
    pub failed_pods: i64,
    pub active_jobs: i64,
    pub succeeded_jobs: i64,
    pub failed_jobs: i64,
}

pub struct MonitorService {
    cluster: Arc<dyn ClusterBackend>,
    policy: Arc<PolicyStore>,
    alerts: Arc<AlertEngine>,
}

impl MonitorService {
    pub fn new(
        cluster: Arc<dyn ClusterBackend>,
        policy: Arc<PolicyStore>,
        alerts: Arc<AlertEngine>,
    ) -> Self {
        Self {
            cluster,
            policy,
            alerts,
        }
    }

    /// Walk every LOB namespace, aggregate pod and job state, emit gauges,
    /// and feed each value through alert evaluation.
    pub async fn collect_cluster_metrics(&self) -> Result<()> {
        let now = Utc::now();
        let admin = self.policy.get_admin_configuration(true).await?;
        let prefix = admin.cluster.lob_namespace_prefix.clone();

        let namespaces = self.cluster.list_namespaces(Some(&prefix)).await?;
        let mut totals = NamespaceCounts::default();

        for namespace in &namespaces {
            let counts = self.collect_namespace(namespace).await?;

            crate::metrics::namespace_gauge(
                "testplane_namespace_running_pods",
                namespace,
                counts.running_pods as f64,
            );
            crate::metrics::namespace_gauge(
                "testplane_namespace_failed_pods",
                namespace,
                counts.failed_pods as f64,
            );
            crate::metrics::namespace_gauge(
                "testplane_namespace_active_jobs",
                namespace,
                counts.active_jobs as f64,
            );

            let dims = BTreeMap::from([("namespace".to_string(), namespace.clone())]);
            self.alerts
                .evaluate("Namespace.RunningPods", counts.running_pods as f64, &dims, now)
                .await;
            self.alerts
                .evaluate("Namespace.FailedPods", counts.failed_pods as f64, &dims, now)
                .await;

            totals.running_pods += counts.running_pods;
            totals.pending_pods += counts.pending_pods;
            totals.failed_pods += counts.failed_pods;
            totals.active_jobs += counts.active_jobs;
            totals.succeeded_jobs += counts.succeeded_jobs;
            totals.failed_jobs += counts.failed_jobs;
        }

        let nodes = self.cluster.list_nodes().await?;
        let ready_nodes = nodes.iter().filter(|n| n.ready).count() as i64;

        let cluster_load = cluster_load(totals.running_pods, ready_nodes);

        crate::metrics::cluster_gauge("testplane_cluster_running_pods", totals.running_pods as f64);
        crate::metrics::cluster_gauge("testplane_cluster_pending_pods", totals.pending_pods as f64);
        crate::metrics::cluster_gauge("testplane_cluster_failed_pods", totals.failed_pods as f64);
        crate::metrics::cluster_gauge("testplane_cluster_active_jobs", totals.active_jobs as f64);
        crate::metrics::cluster_gauge("testplane_cluster_ready_nodes", ready_nodes as f64);
        crate::metrics::cluster_gauge("testplane_cluster_load", cluster_load);

        let no_dims = BTreeMap::new();
        self.alerts
            .evaluate("Cluster.RunningPods", totals.running_pods as f64, &no_dims, now)
            .await;
        self.alerts
            .evaluate("Cluster.PendingPods", totals.pending_pods as f64, &no_dims, now)
            .await;
        self.alerts
            .evaluate("Cluster.FailedPods", totals.failed_pods as f64, &no_dims, now)
            .await;
        self.alerts
            .evaluate("Cluster.ReadyNodes", ready_nodes as f64, &no_dims, now)
            .await;
        self.alerts
            .evaluate("Cluster.Load", cluster_load, &no_dims, now)
            .await;

        tracing::debug!(
            namespaces = namespaces.len(),
            running_pods = totals.running_pods,
            ready_nodes,
            cluster_load,
            "Cluster metrics collected"
        );

        Ok(())
    }

    async fn collect_namespace(&self, namespace: &str) -> Result<NamespaceCounts> {
        let mut counts = NamespaceCounts::default();

        for pod in self.cluster.list_pods(namespace, None).await? {
            match pod.phase.as_str() {
                "Running" => counts.running_pods += 1,
                "Pending" => counts.pending_pods += 1,
                "Failed" => counts.failed_pods += 1,
                _ => {}
            }
        }

        for job in self.cluster.list_jobs(namespace, None).await? {
            if job.active > 0 {
                counts.active_jobs += 1;
            }
            if job.succeeded > 0 {
                counts.succeeded_jobs += 1;
            }
            if job.failed > 0 {
                counts.failed_jobs += 1;
            }
        }

        Ok(counts)
    }
}

/// Coarse utilization heuristic: running pods per node slot, where each
/// ready node is assumed to fit ten runner pods.
pub fn cluster_load(running_pods: i64, ready_nodes: i64) -> f64 {
    running_pods as f64 / (ready_nodes * 10).max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_heuristic_guards_division_by_zero() {
        assert_eq!(cluster_load(0, 0), 0.0);
        assert_eq!(cluster_load(5, 0), 5.0);
        assert_eq!(cluster_load(5, 1), 0.5);
        assert_eq!(cluster_load(30, 2), 1.5);
    }
}
