//! Shared types for podtail
//!
//! This crate contains the values passed between the Kubernetes layer, the
//! log tailing layer and the orchestration engine.

mod condition;
mod container_state;

use chrono::{DateTime, Utc};
use crossterm::style::ContentStyle;
use serde::Serialize;
use std::fmt;

pub use condition::{Condition, ConditionName, ConditionValue};
pub use container_state::ContainerState;

/// Errors raised while parsing user supplied type values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error("containerState should be one of 'running', 'waiting', 'terminated', or 'all'")]
    InvalidContainerState,

    #[error("condition should be one of '{}'", .0.join("', '"))]
    InvalidCondition(Vec<&'static str>),

    #[error("condition value should be one of '{}'", .0.join("', '"))]
    InvalidConditionValue(Vec<&'static str>),
}

// ============================================================================
// Targets
// ============================================================================

/// One watchable container: a (namespace, pod, container) triple plus its node
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub node: String,
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl Target {
    pub fn new(
        node: impl Into<String>,
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }

    /// Identity key of the target, `namespace/pod/container`
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

// ============================================================================
// Resumption
// ============================================================================

/// Where to pick a log stream up again after a disconnect
///
/// `timestamp` has second resolution (RFC3339 without fraction), so
/// `lines_to_skip` counts how many lines within that second were already
/// printed before the stream dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeRequest {
    pub timestamp: String,
    pub lines_to_skip: usize,
}

impl ResumeRequest {
    pub fn new(timestamp: impl Into<String>, lines_to_skip: usize) -> Self {
        Self {
            timestamp: timestamp.into(),
            lines_to_skip,
        }
    }

    /// The `sinceTime` cursor to reopen the stream with
    pub fn since_time(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.timestamp).map(|t| t.with_timezone(&Utc))
    }

    /// Consume one skip for a line stamped `timestamp`
    ///
    /// Returns true while lines at exactly the resumed second remain to be
    /// skipped, then false for everything else.
    pub fn should_skip(&mut self, timestamp: &str) -> bool {
        if self.timestamp.is_empty() || self.timestamp != timestamp {
            return false;
        }
        if self.lines_to_skip == 0 {
            return false;
        }
        self.lines_to_skip -= 1;
        true
    }
}

// ============================================================================
// Output records
// ============================================================================

/// A single log line handed to the template for rendering
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// The log message itself (filtered, highlighted, maybe timestamped)
    pub message: String,

    pub node_name: String,
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,

    #[serde(skip)]
    pub pod_color: ContentStyle,

    #[serde(skip)]
    pub container_color: ContentStyle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id() {
        let target = Target::new("node1", "ns1", "pod1", "app");
        assert_eq!(target.id(), "ns1/pod1/app");
        assert_eq!(target.to_string(), "ns1/pod1/app");
    }

    #[test]
    fn test_resume_request_skips_only_matching_second() {
        let mut req = ResumeRequest::new("2023-02-14T05:36:39Z", 2);
        assert!(!req.should_skip("2023-02-14T05:36:38Z"));
        assert!(req.should_skip("2023-02-14T05:36:39Z"));
        assert!(req.should_skip("2023-02-14T05:36:39Z"));
        assert!(!req.should_skip("2023-02-14T05:36:39Z"));
        assert_eq!(req.lines_to_skip, 0);
    }

    #[test]
    fn test_resume_request_empty_timestamp() {
        let mut req = ResumeRequest::new("", 3);
        assert!(!req.should_skip(""));
        assert_eq!(req.lines_to_skip, 3);
    }

    #[test]
    fn test_resume_request_since_time() {
        let req = ResumeRequest::new("2023-02-14T05:36:39Z", 1);
        let since = req.since_time().unwrap();
        assert_eq!(since.to_rfc3339(), "2023-02-14T05:36:39+00:00");

        let bad = ResumeRequest::new("not a time", 1);
        assert!(bad.since_time().is_err());
    }

    #[test]
    fn test_log_record_json_omits_colors() {
        let record = LogRecord {
            message: "hello".to_string(),
            node_name: "node1".to_string(),
            namespace: "ns1".to_string(),
            pod_name: "pod1".to_string(),
            container_name: "app".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["message"], "hello");
        assert_eq!(value["nodeName"], "node1");
        assert_eq!(value["podName"], "pod1");
        assert_eq!(value["containerName"], "app");
        assert!(value.get("podColor").is_none());
    }
}
