use podtail_k8s::{K8sError, ResourceError};
use podtail_logs::TailError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no namespace given and the current context has no default namespace")]
    NoNamespace,

    #[error("a label selector cannot be combined with a resource query")]
    SelectorAndResource,

    #[error("lost watch connection")]
    WatchLost { namespace: String },

    #[error(
        "podtail reached the maximum number of log requests ({max}), use --max-log-requests to increase the limit"
    )]
    TooManyLogRequests { max: usize },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("invalid pod query: {0}")]
    InvalidQuery(#[from] regex::Error),

    #[error(transparent)]
    K8s(#[from] K8sError),

    #[error(transparent)]
    Tail(#[from] TailError),

    #[error("failed to read stdin: {0}")]
    Stdin(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
