//! Policy documents: the admin configuration singleton and per-user
//! configuration overrides. Both are stored as YAML blobs with
//! server-assigned identity columns.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::alert::AlertSettings;
use crate::schema::{admin_configurations, user_configurations};

/// Compiled-in namespace prefix used when policy cannot be read.
pub const DEFAULT_LOB_NAMESPACE_PREFIX: &str = "testexec-";

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = admin_configurations)]
pub struct AdminConfigurationRow {
    pub id: Uuid,
    pub name: String,
    pub config_yaml: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = admin_configurations)]
pub struct NewAdminConfigurationRow {
    pub id: Uuid,
    pub name: String,
    pub config_yaml: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = user_configurations)]
pub struct UserConfigurationRow {
    pub id: Uuid,
    pub name: String,
    pub lob_id: String,
    pub team_id: String,
    pub user_id: String,
    pub config_yaml: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_configurations)]
pub struct NewUserConfigurationRow {
    pub id: Uuid,
    pub name: String,
    pub lob_id: String,
    pub team_id: String,
    pub user_id: String,
    pub config_yaml: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── YAML documents ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerLimits {
    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            cpu_limit: "1".to_string(),
            memory_limit: "2Gi".to_string(),
            cpu_request: "500m".to_string(),
            memory_request: "512Mi".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManagementSettings {
    pub max_concurrent_jobs_per_lob: i32,
    pub max_concurrent_jobs_per_team: i32,
    pub default_job_timeout_minutes: i64,
    #[serde(default)]
    pub default_container_limits: ContainerLimits,
    pub auto_cleanup_jobs: bool,
    pub cleanup_after_hours: i64,
}

impl Default for ResourceManagementSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs_per_lob: 10,
            max_concurrent_jobs_per_team: 5,
            default_job_timeout_minutes: 60,
            default_container_limits: ContainerLimits::default(),
            auto_cleanup_jobs: true,
            cleanup_after_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSettings {
    pub test_results_retention_days: i64,
    pub job_history_retention_days: i64,
    pub max_test_result_file_size_mb: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            test_results_retention_days: 30,
            job_history_retention_days: 90,
            max_test_result_file_size_mb: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSettings {
    pub system_namespace: String,
    pub lob_namespace_prefix: String,
    #[serde(default)]
    pub node_pools: Vec<String>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            system_namespace: "testplane-system".to_string(),
            lob_namespace_prefix: DEFAULT_LOB_NAMESPACE_PREFIX.to_string(),
            node_pools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSettings {
    pub requests_per_minute: i32,
    pub burst: i32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
            burst: 20,
        }
    }
}

/// The singleton admin policy document bounding all tenant behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfiguration {
    /// Server-assigned; a submitted document cannot forge identity.
    #[serde(skip_deserializing, default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub resource_management: ResourceManagementSettings,
    #[serde(default)]
    pub retention: RetentionSettings,
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub rate_limits: RateLimitSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
}

/// Per-user job-shape overrides, bounded by the admin caps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfiguration {
    pub name: String,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Option<ContainerLimits>,
    #[serde(default)]
    pub schedule: Option<UserScheduleStub>,
}

/// Inline schedule stub a user config may carry; promoted to a real
/// schedule through the schedules API, never fired from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScheduleStub {
    pub schedule_type: String,
    #[serde(default)]
    pub interval_minutes: Option<i32>,
    #[serde(default)]
    pub time_of_day: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_document_yaml_round_trip() {
        let cfg = AdminConfiguration::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: AdminConfiguration = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            back.resource_management.max_concurrent_jobs_per_lob,
            cfg.resource_management.max_concurrent_jobs_per_lob
        );
        assert_eq!(
            back.cluster.lob_namespace_prefix,
            cfg.cluster.lob_namespace_prefix
        );
        assert_eq!(
            back.retention.max_test_result_file_size_mb,
            cfg.retention.max_test_result_file_size_mb
        );
    }

    #[test]
    fn submitted_yaml_cannot_forge_identity() {
        let yaml = "id: 01234567-89ab-cdef-0123-456789abcdef\nresourceManagement:\n  maxConcurrentJobsPerLob: 3\n  maxConcurrentJobsPerTeam: 2\n  defaultJobTimeoutMinutes: 30\n  autoCleanupJobs: false\n  cleanupAfterHours: 12\n";
        let cfg: AdminConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.id.is_none());
        assert_eq!(cfg.resource_management.max_concurrent_jobs_per_lob, 3);
        assert!(!cfg.resource_management.auto_cleanup_jobs);
    }

    #[test]
    fn user_document_defaults_are_empty() {
        let cfg: UserConfiguration = serde_yaml::from_str("name: mine\n").unwrap();
        assert_eq!(cfg.name, "mine");
        assert!(cfg.env_vars.is_empty());
        assert!(cfg.resources.is_none());
    }
}
