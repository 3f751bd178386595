use std::sync::Arc;

use futures::StreamExt;
use podtail_k8s::{PodApi, PodEvent, PodQuery};
use podtail_types::Target;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::target::TargetFilter;

/// List pods once and collect the containers to tail
pub async fn list_targets(
    api: &dyn PodApi,
    namespace: &str,
    query: &PodQuery,
    filter: &TargetFilter,
) -> Result<Vec<Target>> {
    let pods = api.list_pods(namespace, query).await?;

    let mut targets = Vec::new();
    for pod in &pods {
        filter.visit(pod, |target, matched| {
            if matched {
                targets.push(target);
            }
        });
    }
    tracing::debug!(namespace, pods = pods.len(), targets = targets.len(), "listed targets");
    Ok(targets)
}

/// Watch pods in one namespace and send every container that should be
/// tailed to `tx`
///
/// Runs until cancelled. An event stream that ends on its own means the
/// watch cannot be resumed and is reported as `EngineError::WatchLost`.
pub async fn watch_targets(
    api: Arc<dyn PodApi>,
    namespace: String,
    query: PodQuery,
    filter: Arc<TargetFilter>,
    tx: mpsc::Sender<Target>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut events = api.watch_pods(&namespace, &query);
    tracing::debug!(namespace = %namespace, ?query, "watching pods");

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            event = events.next() => event,
        };

        match event {
            Some(Ok(PodEvent::Added(pod) | PodEvent::Modified(pod))) => {
                let mut added = Vec::new();
                filter.visit(&pod, |target, matched| {
                    if matched {
                        added.push(target);
                    }
                });
                for target in added {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        sent = tx.send(target) => {
                            // receiver gone, the run is shutting down
                            if sent.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Some(Ok(PodEvent::Deleted(pod))) => {
                if let Some(uid) = pod.metadata.uid.as_deref() {
                    filter.forget(uid);
                }
            }
            Some(Err(e)) => {
                tracing::warn!(namespace = %namespace, error = %e, "pod watch error, retrying");
            }
            None => {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                return Err(EngineError::WatchLost { namespace });
            }
        }
    }
}
