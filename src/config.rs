//! Platform configuration — loaded from environment variables.

/// Which managed Kubernetes flavor the backend talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterProviderKind {
    Aks,
    OpenShift,
}

impl ClusterProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aks" => Some(Self::Aks),
            "openshift" => Some(Self::OpenShift),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aks => "aks",
            Self::OpenShift => "openshift",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Provider variant (auth path + annotations).
    pub provider: ClusterProviderKind,
    /// Path to a kubeconfig file; empty means in-cluster / default discovery.
    pub kubeconfig_path: String,
    /// Registry the runner images are pulled from.
    pub container_registry: String,
}

#[derive(Clone, Debug)]
pub struct MessagingConfig {
    /// Bus provider name; "log" publishes to the tracing stream.
    pub provider: String,
    pub bootstrap_servers: String,
    /// Topic the result metadata events land on.
    pub test_results_topic: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Root directory of the filesystem blob store.
    pub root: String,
    /// Container (top-level directory) holding test artifacts.
    pub test_results_container: String,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub sendgrid_api_key: String,
    pub sender_email: String,
    /// Secret used to sign outbound webhook payloads; empty disables signing.
    pub webhook_signing_secret: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub cluster: ClusterConfig,
    pub messaging: MessagingConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let provider = std::env::var("KUBE_PROVIDER")
            .ok()
            .and_then(|s| ClusterProviderKind::parse(&s))
            .unwrap_or(ClusterProviderKind::Aks);
        let kubeconfig_path = std::env::var("KUBECONFIG_PATH").unwrap_or_default();
        let container_registry = std::env::var("CONTAINER_REGISTRY")
            .unwrap_or_else(|_| "testplane.azurecr.io".to_string());

        let messaging_provider =
            std::env::var("MESSAGING_PROVIDER").unwrap_or_else(|_| "log".to_string());
        let bootstrap_servers = std::env::var("KAFKA_BOOTSTRAP_SERVERS").unwrap_or_default();
        let test_results_topic = std::env::var("KAFKA_TEST_RESULTS_TOPIC")
            .unwrap_or_else(|_| "test-results-metadata".to_string());

        let storage_root =
            std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "/var/lib/testplane".to_string());
        let test_results_container =
            std::env::var("STORAGE_CONTAINER").unwrap_or_else(|_| "test-results".to_string());

        let sendgrid_api_key = std::env::var("SENDGRID_API_KEY").unwrap_or_default();
        let sender_email = std::env::var("SENDGRID_SENDER_EMAIL").unwrap_or_default();
        let webhook_signing_secret = std::env::var("WEBHOOK_SIGNING_SECRET").unwrap_or_default();

        if sendgrid_api_key.is_empty() {
            tracing::warn!("SENDGRID_API_KEY not set -- email alert delivery disabled");
        }

        Self {
            cluster: ClusterConfig {
                provider,
                kubeconfig_path,
                container_registry,
            },
            messaging: MessagingConfig {
                provider: messaging_provider,
                bootstrap_servers,
                test_results_topic,
            },
            storage: StorageConfig {
                root: storage_root,
                test_results_container,
            },
            notifications: NotificationConfig {
                sendgrid_api_key,
                sender_email,
                webhook_signing_secret,
            },
        }
    }
}
