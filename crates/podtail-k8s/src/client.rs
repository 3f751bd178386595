//! Kubernetes client for podtail

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;

use crate::api::{
    K8sError, K8sResult, LineStream, LogRequest, PodApi, PodEvent, PodEventStream, PodQuery,
};
use crate::lines::split_lines;
use crate::resource::ResourceKind;

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    /// Create a client from a kubeconfig file and context
    ///
    /// Without a path the default kubeconfig is read; without a context either
    /// the current context or the in-cluster service account is used.
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> K8sResult<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            None if context.is_some() => kube::Config::from_kubeconfig(&options).await?,
            None => kube::Config::infer().await?,
        };

        tracing::debug!(
            cluster = %config.cluster_url,
            namespace = %config.default_namespace,
            "connecting to cluster"
        );

        let client = kube::Client::try_from(config)?;
        Ok(Self { client })
    }

    pub fn from_client(client: kube::Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }

    /// Fetch a single namespaced object, mapping 404 to `K8sError::NotFound`
    async fn get<K>(&self, kind: ResourceKind, namespace: &str, name: &str) -> K8sResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => K8sError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => K8sError::Kube(other),
        })
    }
}

#[async_trait]
impl PodApi for KubeClient {
    fn default_namespace(&self) -> Option<String> {
        let namespace = self.client.default_namespace();
        (!namespace.is_empty()).then(|| namespace.to_string())
    }

    async fn list_pods(&self, namespace: &str, query: &PodQuery) -> K8sResult<Vec<Pod>> {
        let list = self.pods(namespace).list(&query.list_params()).await?;
        Ok(list.items)
    }

    fn watch_pods(&self, namespace: &str, query: &PodQuery) -> PodEventStream {
        watcher(self.pods(namespace), query.watcher_config())
            .default_backoff()
            .filter_map(|event| async move {
                match event {
                    Ok(watcher::Event::InitApply(pod)) => Some(Ok(PodEvent::Added(pod))),
                    Ok(watcher::Event::Apply(pod)) => Some(Ok(PodEvent::Modified(pod))),
                    Ok(watcher::Event::Delete(pod)) => Some(Ok(PodEvent::Deleted(pod))),
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
                    Err(e) => Some(Err(K8sError::Watch(e))),
                }
            })
            .boxed()
    }

    async fn log_lines(
        &self,
        namespace: &str,
        pod: &str,
        request: &LogRequest,
    ) -> K8sResult<LineStream> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let reader = api.log_stream(pod, &request.log_params()).await?;
        Ok(split_lines(reader))
    }

    async fn resource_labels(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> K8sResult<BTreeMap<String, String>> {
        let labels = match kind {
            ResourceKind::Pod => self.get::<Pod>(kind, namespace, name).await?.metadata.labels,
            ResourceKind::ReplicationController => self
                .get::<ReplicationController>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.template)
                .and_then(|t| t.metadata)
                .and_then(|m| m.labels),
            ResourceKind::Service => self
                .get::<Service>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.selector),
            ResourceKind::Deployment => self
                .get::<Deployment>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.template.metadata)
                .and_then(|m| m.labels),
            ResourceKind::DaemonSet => self
                .get::<DaemonSet>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.template.metadata)
                .and_then(|m| m.labels),
            ResourceKind::ReplicaSet => self
                .get::<ReplicaSet>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.template)
                .and_then(|t| t.metadata)
                .and_then(|m| m.labels),
            ResourceKind::StatefulSet => self
                .get::<StatefulSet>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.template.metadata)
                .and_then(|m| m.labels),
            ResourceKind::Job => self
                .get::<Job>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.template.metadata)
                .and_then(|m| m.labels),
            ResourceKind::CronJob => self
                .get::<CronJob>(kind, namespace, name)
                .await?
                .spec
                .and_then(|s| s.job_template.spec)
                .and_then(|s| s.template.metadata)
                .and_then(|m| m.labels),
        };

        Ok(labels.unwrap_or_default())
    }
}
