//! Decides which containers of an observed pod should be tailed
//!
//! Each `namespace/pod/container` identity remembers the pod UID and the
//! container ID it was last seen with. A container is handed out again only
//! when that ID changes, i.e. after a restart.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use parking_lot::RwLock;
use podtail_types::{Condition, ContainerState, Target};
use regex::Regex;

#[derive(Clone, Debug)]
pub struct TargetFilterConfig {
    pub pod_filter: Regex,
    pub exclude_pod_filter: Vec<Regex>,
    pub container_filter: Regex,
    pub container_exclude_filter: Vec<Regex>,
    pub condition: Option<Condition>,
    pub init_containers: bool,
    pub ephemeral_containers: bool,
    pub container_states: Vec<ContainerState>,
}

#[derive(Clone, Debug)]
struct TargetState {
    pod_uid: String,
    container_id: String,
}

#[derive(Debug)]
pub struct TargetFilter {
    config: TargetFilterConfig,
    states: RwLock<HashMap<String, TargetState>>,
}

impl TargetFilter {
    pub fn new(config: TargetFilterConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Report the pod's containers to `visitor`
    ///
    /// The flag is true for containers that should be tailed now. When the
    /// pod fails the condition, every matching container is reported with
    /// false and the pod's recorded states are dropped.
    pub fn visit(&self, pod: &Pod, mut visitor: impl FnMut(Target, bool)) {
        let name = pod.metadata.name.as_deref().unwrap_or_default();
        if !self.config.pod_filter.is_match(name)
            || self.config.exclude_pod_filter.iter().any(|re| re.is_match(name))
        {
            return;
        }

        let condition_found = self
            .config
            .condition
            .as_ref()
            .is_none_or(|condition| condition.matches(pod));

        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        let uid = pod.metadata.uid.as_deref().unwrap_or_default();
        let node = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.node_name.as_deref())
            .unwrap_or_default();

        for status in self.candidates(pod) {
            if !self.config.container_filter.is_match(&status.name)
                || self
                    .config
                    .container_exclude_filter
                    .iter()
                    .any(|re| re.is_match(&status.name))
            {
                continue;
            }

            let target = Target::new(node, namespace, name, &status.name);

            if !condition_found {
                visitor(target, false);
                self.forget(uid);
                continue;
            }

            if self.should_add(&target, uid, status) {
                visitor(target, true);
            }
        }
    }

    /// Drop every state recorded for the pod with this UID
    pub fn forget(&self, pod_uid: &str) {
        self.states.write().retain(|id, state| {
            if state.pod_uid == pod_uid {
                tracing::trace!(target_id = %id, "forget target state");
                false
            } else {
                true
            }
        });
    }

    /// Whether the target still has a container whose logs can be read
    pub fn is_active(&self, target: &Target) -> bool {
        self.states
            .read()
            .get(&target.id())
            .is_some_and(|state| !state.container_id.is_empty())
    }

    /// Init, main and ephemeral statuses, in that order
    fn candidates<'a>(&self, pod: &'a Pod) -> Vec<&'a ContainerStatus> {
        let Some(status) = &pod.status else {
            return Vec::new();
        };

        let mut statuses = Vec::new();
        if self.config.init_containers {
            statuses.extend(status.init_container_statuses.iter().flatten());
        }
        statuses.extend(status.container_statuses.iter().flatten());
        if self.config.ephemeral_containers {
            statuses.extend(status.ephemeral_container_statuses.iter().flatten());
        }
        statuses
    }

    fn should_add(&self, target: &Target, pod_uid: &str, status: &ContainerStatus) -> bool {
        let observed = status.state.clone().unwrap_or_default();
        let phase = ContainerState::of(&observed).map_or("unknown", |s| s.as_str());
        let container_id = choose_container_id(status);
        let id = target.id();

        let last = self.states.write().insert(
            id.clone(),
            TargetState {
                pod_uid: pod_uid.to_string(),
                container_id: container_id.clone(),
            },
        );

        if container_id.is_empty() {
            tracing::trace!(target_id = %id, state = phase, "container ID is empty");
            return false;
        }

        match last {
            // Phase history before the first observation is unknown, so only
            // then do the configured states apply
            None => {
                tracing::trace!(target_id = %id, state = phase, container = %container_id, "container seen for the first time");
                self.config
                    .container_states
                    .iter()
                    .any(|state| state.matches(&observed))
            }
            Some(last) if last.container_id == container_id => {
                tracing::trace!(target_id = %id, state = phase, container = %container_id, "container ID unchanged");
                false
            }
            Some(last) => {
                tracing::trace!(target_id = %id, state = phase, container = %container_id, last = %last.container_id, "container ID changed");
                true
            }
        }
    }
}

/// ID of the container whose logs the API would return
fn choose_container_id(status: &ContainerStatus) -> String {
    let state = status.state.as_ref();
    if state.is_some_and(|s| s.running.is_some()) {
        return status.container_id.clone().unwrap_or_default();
    }
    let terminated = state
        .and_then(|s| s.terminated.as_ref())
        .and_then(|t| t.container_id.as_deref())
        .filter(|id| !id.is_empty());
    if let Some(id) = terminated {
        return id.to_string();
    }
    status
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .and_then(|t| t.container_id.clone())
        .unwrap_or_default()
}
