use std::fmt;
use std::str::FromStr;

/// Kinds that can be tailed by `<kind>/<name>` instead of a pod query
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pod,
    ReplicationController,
    Service,
    Deployment,
    DaemonSet,
    ReplicaSet,
    StatefulSet,
    Job,
    CronJob,
}

impl ResourceKind {
    pub const ALL: [Self; 9] = [
        Self::Pod,
        Self::ReplicationController,
        Self::Service,
        Self::Deployment,
        Self::DaemonSet,
        Self::ReplicaSet,
        Self::StatefulSet,
        Self::Job,
        Self::CronJob,
    ];

    /// Singular lowercase name, e.g. "deployment"
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::ReplicationController => "replicationcontroller",
            Self::Service => "service",
            Self::Deployment => "deployment",
            Self::DaemonSet => "daemonset",
            Self::ReplicaSet => "replicaset",
            Self::StatefulSet => "statefulset",
            Self::Job => "job",
            Self::CronJob => "cronjob",
        }
    }

    /// Short names and plurals accepted besides the singular name
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Pod => &["po", "pods"],
            Self::ReplicationController => &["rc", "replicationcontrollers"],
            Self::Service => &["svc", "services"],
            Self::Deployment => &["deploy", "deployments"],
            Self::DaemonSet => &["ds", "daemonsets"],
            Self::ReplicaSet => &["rs", "replicasets"],
            Self::StatefulSet => &["sts", "statefulsets"],
            // job has no short name
            Self::Job => &["jobs"],
            Self::CronJob => &["cj", "cronjobs"],
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name() == name || self.aliases().contains(&name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("resource must be given as <kind>/<name>, got {0:?}")]
    Malformed(String),

    #[error("resource type {0:?} is not supported")]
    UnsupportedKind(String),
}

/// A `<kind>/<name>` reference such as `deploy/web`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
}

impl FromStr for ResourceRef {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('/')
            .filter(|(kind, name)| !kind.is_empty() && !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| ResourceError::Malformed(s.to_string()))?;

        let kind_lower = kind.to_lowercase();
        let kind = ResourceKind::ALL
            .into_iter()
            .find(|k| k.matches(&kind_lower))
            .ok_or_else(|| ResourceError::UnsupportedKind(kind.to_string()))?;

        Ok(Self {
            kind,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_aliases() {
        for kind in ResourceKind::ALL {
            for alias in kind.aliases().iter().copied().chain([kind.name()]) {
                let parsed: ResourceRef = format!("{alias}/web").parse().unwrap();
                assert_eq!(parsed.kind, kind);
                assert_eq!(parsed.name, "web");
            }
        }
    }

    #[test]
    fn test_parse_is_case_insensitive_on_kind() {
        let parsed: ResourceRef = "Deployment/Web".parse().unwrap();
        assert_eq!(parsed.kind, ResourceKind::Deployment);
        assert_eq!(parsed.name, "Web");
        assert_eq!(parsed.to_string(), "deployment/Web");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "web".parse::<ResourceRef>(),
            Err(ResourceError::Malformed("web".to_string()))
        );
        assert!(matches!(
            "deploy/".parse::<ResourceRef>(),
            Err(ResourceError::Malformed(_))
        ));
        assert!(matches!(
            "a/b/c".parse::<ResourceRef>(),
            Err(ResourceError::Malformed(_))
        ));
        assert_eq!(
            "unknown/web".parse::<ResourceRef>(),
            Err(ResourceError::UnsupportedKind("unknown".to_string()))
        );
    }
}
