use k8s_openapi::api::core::v1::ContainerState as ObservedState;
use std::fmt;
use std::str::FromStr;

use crate::TypeError;

/// Runtime phase of a container accepted for tailing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerState {
    Running,
    Waiting,
    Terminated,
    /// Matches any phase
    All,
}

impl ContainerState {
    /// Whether the observed runtime state is in this phase
    pub fn matches(&self, observed: &ObservedState) -> bool {
        match self {
            Self::All => true,
            Self::Running => observed.running.is_some(),
            Self::Waiting => observed.waiting.is_some(),
            Self::Terminated => observed.terminated.is_some(),
        }
    }

    /// Name the active phase of an observed state
    pub fn of(observed: &ObservedState) -> Option<Self> {
        if observed.running.is_some() {
            Some(Self::Running)
        } else if observed.terminated.is_some() {
            Some(Self::Terminated)
        } else if observed.waiting.is_some() {
            Some(Self::Waiting)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Terminated => "terminated",
            Self::All => "all",
        }
    }
}

impl FromStr for ContainerState {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "waiting" => Ok(Self::Waiting),
            "terminated" => Ok(Self::Terminated),
            "all" => Ok(Self::All),
            _ => Err(TypeError::InvalidContainerState),
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
