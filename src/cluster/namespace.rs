//! LOB → cluster namespace resolution.

use std::sync::Arc;

use crate::cluster::ClusterBackend;
use crate::error::{ClusterError, Result};
use crate::models::configuration::DEFAULT_LOB_NAMESPACE_PREFIX;
use crate::services::policy::PolicyStore;

/// Pure namespace derivation: `prefix + lowercase(lob_id)`.
pub fn namespace_for_lob_with_prefix(prefix: &str, lob_id: &str) -> String {
    format!("{prefix}{}", lob_id.to_lowercase())
}

/// Resolves and ensures LOB namespaces. The prefix comes from the cached
/// admin configuration and is read asynchronously; the compiled-in default
/// covers the path where policy cannot be loaded.
pub struct NamespaceResolver {
    policy: Arc<PolicyStore>,
    cluster: Arc<dyn ClusterBackend>,
}

impl NamespaceResolver {
    pub fn new(policy: Arc<PolicyStore>, cluster: Arc<dyn ClusterBackend>) -> Self {
        Self { policy, cluster }
    }

    pub async fn namespace_for_lob(&self, lob_id: &str) -> String {
        let prefix = match self.policy.get_admin_configuration(true).await {
            Ok(cfg) => cfg.cluster.lob_namespace_prefix,
            Err(e) => {
                tracing::warn!("Falling back to default namespace prefix: {e}");
                DEFAULT_LOB_NAMESPACE_PREFIX.to_string()
            }
        };
        namespace_for_lob_with_prefix(&prefix, lob_id)
    }

    /// Derive the namespace and create it on the cluster if missing.
    pub async fn ensure_namespace_exists(&self, lob_id: &str) -> Result<String> {
        let namespace = self.namespace_for_lob(lob_id).await;
        self.cluster
            .create_namespace_if_not_exists(&namespace)
            .await
            .map_err(crate::error::Error::Cluster)?;
        Ok(namespace)
    }

    /// Pass-through used by health checks.
    pub async fn probe(&self) -> std::result::Result<(), ClusterError> {
        self.cluster.list_nodes().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_pure_and_lowercases() {
        assert_eq!(
            namespace_for_lob_with_prefix("testexec-", "ACME"),
            "testexec-acme"
        );
        assert_eq!(
            namespace_for_lob_with_prefix("testexec-", "acme"),
            "testexec-acme"
        );
        assert_eq!(namespace_for_lob_with_prefix("p-", "Lob1"), "p-lob1");
    }
}
