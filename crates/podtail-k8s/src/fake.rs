//! In-memory `PodApi` for tests

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use k8s_openapi::api::core::v1::Pod;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::api::{
    K8sError, K8sResult, LineStream, LogRequest, PodApi, PodEvent, PodEventStream, PodQuery,
};
use crate::resource::ResourceKind;

/// How a scripted log stream ends after its lines
#[derive(Clone, Debug)]
pub enum LogEnd {
    Eof,
    Error(String),
    /// Stays open until the reader gives up
    Pending,
}

/// One scripted answer to `log_lines`
#[derive(Clone, Debug)]
pub struct LogScript {
    pub lines: Vec<String>,
    pub end: LogEnd,
}

impl LogScript {
    pub fn new<I, S>(lines: I, end: LogEnd) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            end,
        }
    }

    fn into_stream(self) -> LineStream {
        let lines = stream::iter(self.lines.into_iter().map(Ok));
        match self.end {
            LogEnd::Eof => lines.boxed(),
            LogEnd::Error(msg) => lines
                .chain(stream::once(async move { Err(K8sError::Other(msg)) }))
                .boxed(),
            LogEnd::Pending => lines.chain(stream::pending()).boxed(),
        }
    }
}

type ContainerKey = (String, String, String);

/// A recorded `log_lines` call
#[derive(Clone, Debug)]
pub struct LogCall {
    pub namespace: String,
    pub pod: String,
    pub request: LogRequest,
}

/// Scriptable cluster: pods to list, watch events pushed by the test,
/// log streams queued per container, and resource labels
#[derive(Default)]
pub struct FakePodApi {
    default_namespace: Option<String>,
    pods: Mutex<HashMap<String, Vec<Pod>>>,
    watch_senders: Mutex<HashMap<String, mpsc::UnboundedSender<K8sResult<PodEvent>>>>,
    watch_receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<K8sResult<PodEvent>>>>,
    logs: Mutex<HashMap<ContainerKey, VecDeque<LogScript>>>,
    log_calls: Mutex<Vec<LogCall>>,
    labels: Mutex<HashMap<(String, ResourceKind, String), BTreeMap<String, String>>>,
}

impl FakePodApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_namespace(namespace: &str) -> Self {
        Self {
            default_namespace: Some(namespace.to_string()),
            ..Self::default()
        }
    }

    /// Pods returned by `list_pods` for a namespace
    pub fn add_pod(&self, namespace: &str, pod: Pod) {
        self.pods
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .push(pod);
    }

    /// Sender feeding the watch on `namespace`. Dropping every sender ends
    /// the watch stream.
    pub fn watch_sender(&self, namespace: &str) -> mpsc::UnboundedSender<K8sResult<PodEvent>> {
        let mut senders = self.watch_senders.lock();
        if let Some(tx) = senders.get(namespace) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(namespace.to_string(), tx.clone());
        self.watch_receivers.lock().insert(namespace.to_string(), rx);
        tx
    }

    /// Forget the stored sender so the watch ends once callers drop theirs
    pub fn close_watch(&self, namespace: &str) {
        self.watch_senders.lock().remove(namespace);
    }

    /// Queue the answer for the next `log_lines` call on a container
    pub fn push_logs(&self, namespace: &str, pod: &str, container: &str, script: LogScript) {
        self.logs
            .lock()
            .entry((namespace.to_string(), pod.to_string(), container.to_string()))
            .or_default()
            .push_back(script);
    }

    pub fn set_resource_labels(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
        labels: BTreeMap<String, String>,
    ) {
        self.labels
            .lock()
            .insert((namespace.to_string(), kind, name.to_string()), labels);
    }

    pub fn log_calls(&self) -> Vec<LogCall> {
        self.log_calls.lock().clone()
    }
}

#[async_trait]
impl PodApi for FakePodApi {
    fn default_namespace(&self) -> Option<String> {
        self.default_namespace.clone()
    }

    async fn list_pods(&self, namespace: &str, _query: &PodQuery) -> K8sResult<Vec<Pod>> {
        let pods = self.pods.lock();
        if namespace.is_empty() {
            return Ok(pods.values().flatten().cloned().collect());
        }
        Ok(pods.get(namespace).cloned().unwrap_or_default())
    }

    fn watch_pods(&self, namespace: &str, _query: &PodQuery) -> PodEventStream {
        match self.watch_receivers.lock().remove(namespace) {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn log_lines(
        &self,
        namespace: &str,
        pod: &str,
        request: &LogRequest,
    ) -> K8sResult<LineStream> {
        self.log_calls.lock().push(LogCall {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            request: request.clone(),
        });

        let key = (
            namespace.to_string(),
            pod.to_string(),
            request.container.clone(),
        );
        let script = self
            .logs
            .lock()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| LogScript::new(Vec::<String>::new(), LogEnd::Eof));

        Ok(script.into_stream())
    }

    async fn resource_labels(
        &self,
        namespace: &str,
        kind: ResourceKind,
        name: &str,
    ) -> K8sResult<BTreeMap<String, String>> {
        self.labels
            .lock()
            .get(&(namespace.to_string(), kind, name.to_string()))
            .cloned()
            .ok_or_else(|| K8sError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_scripted_logs_in_order() {
        let api = FakePodApi::new();
        api.push_logs("ns", "pod", "app", LogScript::new(["a", "b"], LogEnd::Eof));
        api.push_logs("ns", "pod", "app", LogScript::new(["c"], LogEnd::Eof));

        let request = LogRequest {
            container: "app".to_string(),
            ..Default::default()
        };

        let first: Vec<String> = api
            .log_lines("ns", "pod", &request)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first, ["a", "b"]);

        let second: Vec<String> = api
            .log_lines("ns", "pod", &request)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(second, ["c"]);
        assert_eq!(api.log_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_error_end() {
        let api = FakePodApi::new();
        api.push_logs(
            "ns",
            "pod",
            "app",
            LogScript::new(["a"], LogEnd::Error("boom".to_string())),
        );
        let request = LogRequest {
            container: "app".to_string(),
            ..Default::default()
        };

        let mut lines = api.log_lines("ns", "pod", &request).await.unwrap();
        assert_eq!(lines.try_next().await.unwrap().as_deref(), Some("a"));
        assert!(lines.try_next().await.is_err());
    }

    #[tokio::test]
    async fn test_watch_ends_when_senders_dropped() {
        let api = FakePodApi::new();
        let tx = api.watch_sender("ns");
        tx.send(Ok(PodEvent::Added(Pod::default()))).unwrap();
        drop(tx);
        api.close_watch("ns");

        let events: Vec<_> = api.watch_pods("ns", &PodQuery::default()).collect().await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let api = FakePodApi::new();
        let err = api
            .resource_labels("ns", ResourceKind::Deployment, "web")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
