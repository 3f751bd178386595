use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// Pod condition types that can be required before tailing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionName {
    ContainersReady,
    Initialized,
    Ready,
    PodScheduled,
    DisruptionTarget,
    PodReadyToStartContainers,
}

impl ConditionName {
    const ALL: [Self; 6] = [
        Self::ContainersReady,
        Self::Initialized,
        Self::Ready,
        Self::PodScheduled,
        Self::DisruptionTarget,
        Self::PodReadyToStartContainers,
    ];

    /// Name as it appears in `status.conditions[].type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContainersReady => "ContainersReady",
            Self::Initialized => "Initialized",
            Self::Ready => "Ready",
            Self::PodScheduled => "PodScheduled",
            Self::DisruptionTarget => "DisruptionTarget",
            Self::PodReadyToStartContainers => "PodReadyToStartContainers",
        }
    }
}

/// Desired status of a pod condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionValue {
    True,
    False,
    Unknown,
}

impl ConditionValue {
    const ALL: [Self; 3] = [Self::True, Self::False, Self::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }
}

/// A required pod condition such as `Ready=True`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Condition {
    pub name: ConditionName,
    pub value: ConditionValue,
}

impl Condition {
    /// Check whether the pod satisfies this condition
    pub fn matches(&self, pod: &Pod) -> bool {
        // Job pods drop Ready once they complete
        if self.name == ConditionName::Ready {
            let owned_by_job = pod
                .metadata
                .owner_references
                .iter()
                .flatten()
                .any(|owner| owner.kind == "Job");
            if owned_by_job {
                return true;
            }
        }

        pod.status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .into_iter()
            .flatten()
            .find(|c| c.type_ == self.name.as_str())
            .is_some_and(|c| c.status == self.value.as_str())
    }
}

impl FromStr for Condition {
    type Err = TypeError;

    /// Parse `name` or `name=value`, case-insensitively. The value defaults to true.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let (name, value) = lower.split_once('=').unwrap_or((lower.as_str(), "true"));

        let name = ConditionName::ALL
            .into_iter()
            .find(|n| n.as_str().to_lowercase() == name)
            .ok_or_else(|| {
                TypeError::InvalidCondition(ConditionName::ALL.iter().map(|n| n.as_str()).collect())
            })?;

        let value = ConditionValue::ALL
            .into_iter()
            .find(|v| v.as_str().to_lowercase() == value)
            .ok_or_else(|| {
                TypeError::InvalidConditionValue(
                    ConditionValue::ALL.iter().map(|v| v.as_str()).collect(),
                )
            })?;

        Ok(Self { name, value })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name.as_str(), self.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn pod(conditions: &[(&str, &str)], owner_kind: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("pod1".to_string()),
                owner_references: owner_kind.map(|kind| {
                    vec![OwnerReference {
                        kind: kind.to_string(),
                        name: "owner".to_string(),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            },
            status: Some(PodStatus {
                conditions: Some(
                    conditions
                        .iter()
                        .map(|(type_, status)| PodCondition {
                            type_: type_.to_string(),
                            status: status.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse() {
        let c: Condition = "ready".parse().unwrap();
        assert_eq!(c.name, ConditionName::Ready);
        assert_eq!(c.value, ConditionValue::True);

        let c: Condition = "PodScheduled=FALSE".parse().unwrap();
        assert_eq!(c.name, ConditionName::PodScheduled);
        assert_eq!(c.value, ConditionValue::False);

        let c: Condition = "podreadytostartcontainers=unknown".parse().unwrap();
        assert_eq!(c.name, ConditionName::PodReadyToStartContainers);
        assert_eq!(c.value, ConditionValue::Unknown);
    }

    #[test]
    fn test_parse_errors() {
        let err = "healthy".parse::<Condition>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidCondition(_)));
        assert!(err.to_string().contains("'Ready'"));

        let err = "ready=maybe".parse::<Condition>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidConditionValue(_)));
        assert_eq!(
            err.to_string(),
            "condition value should be one of 'True', 'False', 'Unknown'"
        );
    }

    #[test]
    fn test_matches_condition_status() {
        let ready: Condition = "ready".parse().unwrap();
        let not_ready: Condition = "ready=false".parse().unwrap();

        let p = pod(&[("PodScheduled", "True"), ("Ready", "True")], None);
        assert!(ready.matches(&p));
        assert!(!not_ready.matches(&p));

        let p = pod(&[("Ready", "False")], None);
        assert!(!ready.matches(&p));
        assert!(not_ready.matches(&p));
    }

    #[test]
    fn test_missing_condition_does_not_match() {
        let scheduled: Condition = "podscheduled".parse().unwrap();
        assert!(!scheduled.matches(&pod(&[("Ready", "True")], None)));
        assert!(!scheduled.matches(&Pod::default()));
    }

    #[test]
    fn test_job_pods_always_ready() {
        for value in ["ready=true", "ready=false", "ready=unknown"] {
            let c: Condition = value.parse().unwrap();
            assert!(c.matches(&pod(&[], Some("Job"))), "{value}");
            assert!(c.matches(&pod(&[("Ready", "False")], Some("Job"))), "{value}");
        }

        // only Ready gets the bypass
        let initialized: Condition = "initialized".parse().unwrap();
        assert!(!initialized.matches(&pod(&[("Initialized", "False")], Some("Job"))));

        // and only for Job owners
        let ready: Condition = "ready".parse().unwrap();
        assert!(!ready.matches(&pod(&[("Ready", "False")], Some("ReplicaSet"))));
    }
}
