//! Kubernetes-backed cluster implementation.
//!
//! One backend struct serves both provider variants; they differ only in
//! how the client is constructed and in provider-specific pod annotations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, Namespace, Node, Pod, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams, PropagationPolicy};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;

use crate::cluster::{ClusterBackend, JobInfo, NodeInfo, PodInfo, WorkloadSpec};
use crate::config::{ClusterConfig, ClusterProviderKind};
use crate::error::ClusterError;

const RUNNER_CONTAINER_NAME: &str = "test-runner";
const RUNNER_COMMAND: &[&str] = &["/bin/bash", "-c", "/run-tests.sh"];

pub struct KubeBackend {
    client: Client,
    provider: ClusterProviderKind,
}

impl KubeBackend {
    /// Connect using the provider's auth path: AKS reads the configured
    /// kubeconfig (or default discovery), OpenShift prefers the in-cluster
    /// service account and falls back to the kubeconfig.
    pub async fn connect(config: &ClusterConfig) -> Result<Self, ClusterError> {
        let client = match config.provider {
            ClusterProviderKind::Aks => Self::client_from_kubeconfig(&config.kubeconfig_path).await?,
            ClusterProviderKind::OpenShift => match kube::Config::incluster() {
                Ok(cfg) => Client::try_from(cfg)
                    .map_err(|e| ClusterError::Other(format!("client init: {e}")))?,
                Err(_) => Self::client_from_kubeconfig(&config.kubeconfig_path).await?,
            },
        };

        tracing::info!(provider = config.provider.as_str(), "Cluster backend connected");

        Ok(Self {
            client,
            provider: config.provider,
        })
    }

    async fn client_from_kubeconfig(path: &str) -> Result<Client, ClusterError> {
        if path.is_empty() {
            return Client::try_default()
                .await
                .map_err(|e| ClusterError::Unavailable(format!("default client: {e}")));
        }

        let kubeconfig = Kubeconfig::read_from(path)
            .map_err(|e| ClusterError::Other(format!("kubeconfig {path}: {e}")))?;
        let cfg = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ClusterError::Other(format!("kubeconfig {path}: {e}")))?;
        Client::try_from(cfg).map_err(|e| ClusterError::Other(format!("client init: {e}")))
    }

    fn pod_annotations(&self) -> Option<BTreeMap<String, String>> {
        match self.provider {
            ClusterProviderKind::Aks => None,
            ClusterProviderKind::OpenShift => Some(BTreeMap::from([(
                "openshift.io/scc".to_string(),
                "restricted-v2".to_string(),
            )])),
        }
    }

    fn build_job(&self, spec: &WorkloadSpec) -> Job {
        let mut labels = BTreeMap::from([
            ("app".to_string(), "testplane".to_string()),
            ("testplane/lob".to_string(), spec.lob_id.clone()),
        ]);
        labels.insert("job-name".to_string(), spec.job_name.clone());

        let mut env = vec![EnvVar {
            name: "REPO_URL".to_string(),
            value: Some(spec.repo_url.clone()),
            ..Default::default()
        }];
        for (name, value) in &spec.env {
            env.push(EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            });
        }

        let limits = BTreeMap::from([
            ("cpu".to_string(), Quantity(spec.cpu_limit.clone())),
            ("memory".to_string(), Quantity(spec.memory_limit.clone())),
        ]);
        let requests = BTreeMap::from([
            ("cpu".to_string(), Quantity(spec.cpu_request.clone())),
            ("memory".to_string(), Quantity(spec.memory_request.clone())),
        ]);

        Job {
            metadata: ObjectMeta {
                name: Some(spec.job_name.clone()),
                namespace: Some(spec.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                active_deadline_seconds: Some(spec.active_deadline_seconds),
                backoff_limit: Some(0),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        annotations: self.pod_annotations(),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        containers: vec![Container {
                            name: RUNNER_CONTAINER_NAME.to_string(),
                            image: Some(spec.image.clone()),
                            command: Some(RUNNER_COMMAND.iter().map(|s| s.to_string()).collect()),
                            env: Some(env),
                            resources: Some(ResourceRequirements {
                                limits: Some(limits),
                                requests: Some(requests),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn job_info(job: &Job) -> JobInfo {
    let status = job.status.as_ref();
    JobInfo {
        name: job.metadata.name.clone().unwrap_or_default(),
        active: status.and_then(|s| s.active).unwrap_or(0),
        succeeded: status.and_then(|s| s.succeeded).unwrap_or(0),
        failed: status.and_then(|s| s.failed).unwrap_or(0),
        completion_time: status.and_then(|s| s.completion_time.as_ref().map(|t| t.0)),
    }
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

#[async_trait]
impl ClusterBackend for KubeBackend {
    async fn create_test_job(&self, spec: &WorkloadSpec) -> Result<String, ClusterError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &spec.namespace);
        let job = self.build_job(spec);
        api.create(&PostParams::default(), &job).await?;

        tracing::info!(
            job_name = %spec.job_name,
            namespace = %spec.namespace,
            image = %spec.image,
            "Cluster job created"
        );

        Ok(spec.job_name.clone())
    }

    async fn get_job(&self, job_name: &str, namespace: &str) -> Result<JobInfo, ClusterError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let job = api.get(job_name).await?;
        Ok(job_info(&job))
    }

    async fn is_job_completed(
        &self,
        job_name: &str,
        namespace: &str,
    ) -> Result<bool, ClusterError> {
        Ok(self.get_job(job_name, namespace).await?.is_terminal())
    }

    async fn get_job_logs(&self, job_name: &str, namespace: &str) -> Result<String, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("job-name={job_name}");
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await?;

        let pod_name = match list.items.first().and_then(|p| p.metadata.name.clone()) {
            Some(name) => name,
            None => return Ok(format!("No pods found for job {job_name}")),
        };

        let logs = pods.logs(&pod_name, &LogParams::default()).await?;
        Ok(logs)
    }

    async fn delete_job(&self, job_name: &str, namespace: &str) -> Result<(), ClusterError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        api.delete(job_name, &params).await?;
        Ok(())
    }

    async fn create_namespace_if_not_exists(&self, name: &str) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        match api.get(name).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(e.into()),
        }

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    "testplane/managed".to_string(),
                    "true".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };

        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                tracing::info!(namespace = name, "Namespace created");
                Ok(())
            }
            // Lost a concurrent create race; the namespace exists.
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_namespaces(&self, prefix: Option<&str>) -> Result<Vec<String>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .filter(|name| prefix.map_or(true, |p| name.starts_with(p)))
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<PodInfo>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = api.list(&params).await?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| PodInfo {
                name: pod.metadata.name.clone().unwrap_or_default(),
                phase: pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
            })
            .collect())
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<JobInfo>, ClusterError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = api.list(&params).await?;
        Ok(list.items.iter().map(job_info).collect())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;

        Ok(list
            .items
            .iter()
            .map(|node| NodeInfo {
                name: node.metadata.name.clone().unwrap_or_default(),
                ready: node_is_ready(node),
            })
            .collect())
    }

    async fn cleanup_completed_jobs(
        &self,
        namespace: &str,
        older_than: DateTime<Utc>,
    ) -> Result<u32, ClusterError> {
        let jobs = self.list_jobs(namespace, None).await?;
        let mut deleted = 0u32;

        for job in jobs {
            if !job.is_terminal() {
                continue;
            }
            let old_enough = job.completion_time.map(|t| t < older_than).unwrap_or(false);
            if !old_enough {
                continue;
            }

            match self.delete_job(&job.name, namespace).await {
                Ok(()) => deleted += 1,
                Err(ClusterError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(job = %job.name, namespace, "Cleanup delete failed: {e}");
                }
            }
        }

        if deleted > 0 {
            tracing::info!(namespace, deleted, "Cleaned up completed jobs");
        }
        Ok(deleted)
    }
}
