//! Top level orchestration of watches and tails

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use podtail_k8s::{PodApi, PodQuery, ResourceKind};
use podtail_logs::{StdinTail, Tail, TailContext};
use podtail_types::{ResumeRequest, Target};
use regex::Regex;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, RETRY_BURST};
use crate::error::{EngineError, Result};
use crate::limiter::RetryLimiter;
use crate::registry::TailRegistry;
use crate::target::TargetFilter;
use crate::watch::{list_targets, watch_targets};

const TARGET_CHANNEL_SIZE: usize = 128;

/// Tail logs as configured until the streams end, an error stops the run,
/// or `cancel` fires
pub async fn run(api: Arc<dyn PodApi>, config: Config, cancel: CancellationToken) -> Result<()> {
    if config.stdin {
        return tail_stdin(&config, &cancel).await;
    }

    let namespaces = resolve_namespaces(api.as_ref(), &config)?;
    let (pod_filter, queries) = resolve_queries(api.as_ref(), &config, &namespaces).await?;
    let filter = Arc::new(TargetFilter::new(config.target_filter_config(pod_filter)));

    let ctx = tail_context(&config);

    tracing::info!(
        namespaces = ?namespaces,
        follow = config.follow,
        max_log_requests = config.max_log_requests,
        "starting"
    );

    if config.follow {
        Follow::new(api, ctx, filter, &config)
            .run(queries, cancel)
            .await
    } else {
        run_batch(api, ctx, filter, queries, config.max_log_requests, cancel).await
    }
}

fn tail_context(config: &Config) -> Arc<TailContext> {
    let mut options = config.tail.clone();
    options.follow = config.follow;
    Arc::new(TailContext {
        options,
        renderer: Arc::clone(&config.template),
        palette: Arc::new(config.palette.clone()),
        diff_container: config.diff_container,
        output: config.output.clone(),
    })
}

/// Filter and render lines read from stdin instead of a cluster
pub async fn tail_stdin(config: &Config, cancel: &CancellationToken) -> Result<()> {
    let tail = StdinTail::new(
        Arc::clone(&config.tail.filter),
        Arc::clone(&config.template),
        config.output.clone(),
        config.palette.highlight(),
    );
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tail.run(stdin, cancel).await?;
    Ok(())
}

/// Namespaces to query, `""` meaning all of them
fn resolve_namespaces(api: &dyn PodApi, config: &Config) -> Result<Vec<String>> {
    if config.all_namespaces {
        return Ok(vec![String::new()]);
    }
    if !config.namespaces.is_empty() {
        let mut namespaces: Vec<String> = Vec::with_capacity(config.namespaces.len());
        for namespace in &config.namespaces {
            if !namespaces.contains(namespace) {
                namespaces.push(namespace.clone());
            }
        }
        return Ok(namespaces);
    }
    api.default_namespace()
        .map(|namespace| vec![namespace])
        .ok_or(EngineError::NoNamespace)
}

/// Pod name filter plus the pod query for each namespace
async fn resolve_queries(
    api: &dyn PodApi,
    config: &Config,
    namespaces: &[String],
) -> Result<(Regex, Vec<(String, PodQuery)>)> {
    let base = PodQuery {
        label_selector: config.label_selector.clone(),
        field_selector: config.field_selector.clone(),
    };
    let same_query = || {
        namespaces
            .iter()
            .map(|namespace| (namespace.clone(), base.clone()))
            .collect::<Vec<_>>()
    };

    let Some(resource) = &config.resource else {
        return Ok((config.pod_query.clone(), same_query()));
    };
    if config.label_selector.is_some() {
        return Err(EngineError::SelectorAndResource);
    }

    if resource.kind == ResourceKind::Pod {
        // pods may have no labels, match the exact name instead
        let exact = Regex::new(&format!("^{}$", regex::escape(&resource.name)))?;
        return Ok((exact, same_query()));
    }

    let mut queries = Vec::with_capacity(namespaces.len());
    for namespace in namespaces {
        let labels = api
            .resource_labels(namespace, resource.kind, &resource.name)
            .await?;
        tracing::debug!(namespace = %namespace, %resource, ?labels, "resolved resource labels");
        queries.push((
            namespace.clone(),
            PodQuery {
                label_selector: Some(label_selector(&labels)),
                field_selector: base.field_selector.clone(),
            },
        ));
    }
    Ok((config.pod_query.clone(), queries))
}

fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// List once, then run every tail to completion with bounded concurrency
async fn run_batch(
    api: Arc<dyn PodApi>,
    ctx: Arc<TailContext>,
    filter: Arc<TargetFilter>,
    queries: Vec<(String, PodQuery)>,
    max_log_requests: usize,
    cancel: CancellationToken,
) -> Result<()> {
    let mut targets = Vec::new();
    for (namespace, query) in &queries {
        targets.extend(list_targets(api.as_ref(), namespace, query, &filter).await?);
    }
    tracing::info!(targets = targets.len(), "tailing listed targets");

    let group = cancel.child_token();
    let semaphore = Arc::new(Semaphore::new(max_log_requests.max(1)));
    let mut tasks = JoinSet::new();

    for target in targets {
        let permit = tokio::select! {
            biased;
            _ = group.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let api = Arc::clone(&api);
        let ctx = Arc::clone(&ctx);
        let group = group.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let mut tail = Tail::new(api, target, &ctx);
            let result = tail.start(&group).await;
            tail.close();
            if result.is_err() {
                group.cancel();
            }
            result
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let error = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => EngineError::from(e),
            Err(e) => EngineError::from(e),
        };
        group.cancel();
        first_error.get_or_insert(error);
    }
    first_error.map_or(Ok(()), Err)
}

/// Decrements the live request count when a retry loop ends
struct RequestGuard(Arc<AtomicUsize>);

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Follow {
    api: Arc<dyn PodApi>,
    ctx: Arc<TailContext>,
    filter: Arc<TargetFilter>,
    registry: Arc<TailRegistry>,
    /// Live retry loops
    requests: Arc<AtomicUsize>,
    max_log_requests: usize,
    retry_interval: Duration,
}

impl Follow {
    fn new(
        api: Arc<dyn PodApi>,
        ctx: Arc<TailContext>,
        filter: Arc<TargetFilter>,
        config: &Config,
    ) -> Self {
        Self {
            api,
            ctx,
            filter,
            registry: Arc::new(TailRegistry::new()),
            requests: Arc::new(AtomicUsize::new(0)),
            max_log_requests: config.max_log_requests,
            retry_interval: config.retry_interval,
        }
    }

    /// Watch every namespace and keep a retry loop per accepted target
    async fn run(self, queries: Vec<(String, PodQuery)>, cancel: CancellationToken) -> Result<()> {
        let group = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(TARGET_CHANNEL_SIZE);

        let mut watches = JoinSet::new();
        for (namespace, query) in queries {
            watches.spawn(watch_targets(
                Arc::clone(&self.api),
                namespace,
                query,
                Arc::clone(&self.filter),
                tx.clone(),
                group.clone(),
            ));
        }
        drop(tx);

        let requests = Arc::clone(&self.requests);
        let mut tails = JoinSet::new();

        let result = loop {
            tokio::select! {
                biased;
                _ = group.cancelled() => break Ok(()),
                Some(joined) = watches.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Err(e),
                    Err(e) => break Err(e.into()),
                },
                Some(target) = rx.recv() => {
                    let active = requests.fetch_add(1, Ordering::SeqCst) + 1;
                    let guard = RequestGuard(Arc::clone(&requests));
                    if active > self.max_log_requests {
                        break Err(EngineError::TooManyLogRequests {
                            max: self.max_log_requests,
                        });
                    }
                    tracing::debug!(target_id = %target.id(), active, "target added");
                    tails.spawn(self.tail_loop(target, group.clone(), guard));
                }
                Some(joined) = tails.join_next(), if !tails.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, "tail task failed");
                    }
                }
                else => break Ok(()),
            }
        };

        group.cancel();
        self.registry.close_all();
        while tails.join_next().await.is_some() {}
        while watches.join_next().await.is_some() {}
        result
    }

    /// Keep one target tailed until it ends cleanly or goes away
    fn tail_loop(
        &self,
        target: Target,
        cancel: CancellationToken,
        guard: RequestGuard,
    ) -> impl Future<Output = ()> + Send + 'static {
        let api = Arc::clone(&self.api);
        let ctx = Arc::clone(&self.ctx);
        let filter = Arc::clone(&self.filter);
        let registry = Arc::clone(&self.registry);
        let mut limiter = RetryLimiter::new(RETRY_BURST, self.retry_interval);

        async move {
            let _guard = guard;
            let id = target.id();
            let mut resume: Option<ResumeRequest> = None;

            loop {
                if !limiter.wait(&cancel).await {
                    return;
                }

                let mut tail = Tail::new(Arc::clone(&api), target.clone(), &ctx);
                let generation = registry.insert(id.clone(), tail.handle());
                let result = match &resume {
                    Some(request) => tail.resume(&cancel, request.clone()).await,
                    None => tail.start(&cancel).await,
                };
                tail.close();
                registry.remove(&id, generation);

                let Err(e) = result else {
                    return;
                };
                if cancel.is_cancelled() {
                    return;
                }
                if !filter.is_active(&target) {
                    ctx.output.write_err(&format!("failed to tail: {e}\n"));
                    return;
                }
                ctx.output
                    .write_err(&format!("failed to tail: {e}, will retry\n"));
                if let Some(request) = tail.resume_request() {
                    resume = Some(request);
                }
            }
        }
    }
}
