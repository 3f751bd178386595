use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, LogParams};
use kube::runtime::watcher;

use crate::resource::ResourceKind;

pub type K8sResult<T> = Result<T, K8sError>;

/// Stream of log lines, newline stripped
pub type LineStream = BoxStream<'static, K8sResult<String>>;

/// Stream of pod changes from a watch
pub type PodEventStream = BoxStream<'static, K8sResult<PodEvent>>;

#[derive(Debug, thiserror::Error)]
pub enum K8sError {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer cluster config: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("watch error: {0}")]
    Watch(#[from] watcher::Error),

    #[error("log stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("{kind} \"{name}\" not found in namespace \"{namespace}\"")]
    NotFound {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },

    #[error("{0}")]
    Other(String),
}

impl K8sError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }
}

/// Label and field selectors narrowing a pod list or watch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodQuery {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl PodQuery {
    pub fn list_params(&self) -> ListParams {
        let mut params = ListParams::default();
        if let Some(labels) = &self.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            params = params.fields(fields);
        }
        params
    }

    pub fn watcher_config(&self) -> watcher::Config {
        let mut config = watcher::Config::default();
        if let Some(labels) = &self.label_selector {
            config = config.labels(labels);
        }
        if let Some(fields) = &self.field_selector {
            config = config.fields(fields);
        }
        config
    }
}

/// Options for opening one container's log stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogRequest {
    pub container: String,
    pub follow: bool,
    pub timestamps: bool,
    pub since_seconds: Option<i64>,
    pub since_time: Option<DateTime<Utc>>,
    pub tail_lines: Option<i64>,
}

impl LogRequest {
    pub fn log_params(&self) -> LogParams {
        LogParams {
            container: Some(self.container.clone()),
            follow: self.follow,
            timestamps: self.timestamps,
            // the API rejects requests carrying both
            since_seconds: if self.since_time.is_some() {
                None
            } else {
                self.since_seconds
            },
            since_time: self.since_time,
            tail_lines: self.tail_lines,
            ..Default::default()
        }
    }
}

/// A change observed on a watched pod
#[derive(Clone, Debug)]
pub enum PodEvent {
    /// Pod seen during the initial listing of a (re)started watch
    Added(Pod),
    /// Pod created or changed after the initial listing
    Modified(Pod),
    Deleted(Pod),
}

impl PodEvent {
    pub fn pod(&self) -> &Pod {
        match self {
            Self::Added(pod) | Self::Modified(pod) | Self::Deleted(pod) => pod,
        }
    }
}

/// Cluster operations the tailing engine depends on
#[async_trait]
pub trait PodApi: Send + Sync {
    /// Namespace of the current context, if one is configured
    fn default_namespace(&self) -> Option<String>;

    /// List pods once. An empty namespace lists across all namespaces.
    async fn list_pods(&self, namespace: &str, query: &PodQuery) -> K8sResult<Vec<Pod>>;

    /// Watch pods. The stream resumes from the last seen resource version on
    /// transient failures and only ends when the watch is lost for good.
    fn watch_pods(&self, namespace: &str, query: &PodQuery) -> PodEventStream;

    /// Open a container's log stream
    async fn log_lines(&self, namespace: &str, pod: &str, request: &LogRequest)
    -> K8sResult<LineStream>;

    /// Labels selecting the pods managed by a resource
    async fn resource_labels(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> K8sResult<BTreeMap<String, String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_params_prefers_since_time() {
        let since = DateTime::parse_from_rfc3339("2023-02-14T05:36:39Z")
            .unwrap()
            .with_timezone(&Utc);
        let request = LogRequest {
            container: "app".to_string(),
            follow: true,
            timestamps: true,
            since_seconds: Some(60),
            since_time: Some(since),
            tail_lines: None,
        };

        let params = request.log_params();
        assert_eq!(params.container.as_deref(), Some("app"));
        assert!(params.follow);
        assert!(params.timestamps);
        assert_eq!(params.since_seconds, None);
        assert_eq!(params.since_time, Some(since));
    }

    #[test]
    fn test_log_params_since_seconds() {
        let request = LogRequest {
            container: "app".to_string(),
            since_seconds: Some(172800),
            tail_lines: Some(10),
            ..Default::default()
        };

        let params = request.log_params();
        assert_eq!(params.since_seconds, Some(172800));
        assert_eq!(params.tail_lines, Some(10));
        assert!(!params.follow);
    }

    #[test]
    fn test_pod_query_list_params() {
        let query = PodQuery {
            label_selector: Some("app=web".to_string()),
            field_selector: None,
        };
        let params = query.list_params();
        assert_eq!(params.label_selector.as_deref(), Some("app=web"));
        assert_eq!(params.field_selector, None);
    }
}
