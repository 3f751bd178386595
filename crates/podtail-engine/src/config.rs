use std::sync::Arc;
use std::time::Duration;

use podtail_k8s::ResourceRef;
use podtail_logs::{Output, Palette, Renderer, TailOptions, Template};
use podtail_types::{Condition, ContainerState};
use regex::Regex;

use crate::target::TargetFilterConfig;

/// Concurrent log requests allowed while following
pub const DEFAULT_MAX_LOG_REQUESTS: usize = 50;

/// Concurrent log requests allowed with `--no-follow`
pub const DEFAULT_MAX_LOG_REQUESTS_BATCH: usize = 5;

/// How far back logs are requested by default
pub const DEFAULT_SINCE: Duration = Duration::from_secs(48 * 60 * 60);

/// Tokens a retry loop starts with
pub const RETRY_BURST: u32 = 2;

/// Time to regain one retry token
pub const RETRY_INTERVAL: Duration = Duration::from_secs(20);

/// Everything a run needs, already parsed and validated
#[derive(Clone)]
pub struct Config {
    pub namespaces: Vec<String>,
    pub all_namespaces: bool,

    pub pod_query: Regex,
    pub exclude_pod_query: Vec<Regex>,
    pub container_query: Regex,
    pub exclude_container_query: Vec<Regex>,
    pub container_states: Vec<ContainerState>,
    pub condition: Option<Condition>,
    pub init_containers: bool,
    pub ephemeral_containers: bool,

    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// `<kind>/<name>` to tail instead of matching pod names
    pub resource: Option<ResourceRef>,

    pub tail: TailOptions,
    pub follow: bool,
    pub max_log_requests: usize,
    pub retry_interval: Duration,

    pub template: Arc<dyn Renderer>,
    pub palette: Palette,
    pub diff_container: bool,

    /// Read lines from stdin instead of the cluster
    pub stdin: bool,
    pub output: Output,
}

impl Config {
    pub fn new(pod_query: Regex, container_query: Regex, output: Output) -> Self {
        Self {
            namespaces: Vec::new(),
            all_namespaces: false,
            pod_query,
            exclude_pod_query: Vec::new(),
            container_query,
            exclude_container_query: Vec::new(),
            container_states: vec![ContainerState::All],
            condition: None,
            init_containers: true,
            ephemeral_containers: true,
            label_selector: None,
            field_selector: None,
            resource: None,
            tail: TailOptions {
                since_seconds: Some(DEFAULT_SINCE.as_secs() as i64),
                follow: true,
                ..Default::default()
            },
            follow: true,
            max_log_requests: DEFAULT_MAX_LOG_REQUESTS,
            retry_interval: RETRY_INTERVAL,
            template: Arc::new(Template::Default { namespace: false }),
            palette: Palette::default(),
            diff_container: false,
            stdin: false,
            output,
        }
    }

    pub(crate) fn target_filter_config(&self, pod_filter: Regex) -> TargetFilterConfig {
        TargetFilterConfig {
            pod_filter,
            exclude_pod_filter: self.exclude_pod_query.clone(),
            container_filter: self.container_query.clone(),
            container_exclude_filter: self.exclude_container_query.clone(),
            condition: self.condition,
            init_containers: self.init_containers,
            ephemeral_containers: self.ephemeral_containers,
            container_states: self.container_states.clone(),
        }
    }
}
