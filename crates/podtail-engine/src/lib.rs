//! Tail orchestration for podtail
//!
//! [`run`] resolves namespaces and resource queries, then either lists the
//! matching containers once and tails each to the end, or watches pods and
//! keeps a retrying tail alive for every container that starts matching.

mod config;
mod error;
mod limiter;
mod registry;
mod run;
mod target;
mod watch;

pub use config::{
    Config, DEFAULT_MAX_LOG_REQUESTS, DEFAULT_MAX_LOG_REQUESTS_BATCH, DEFAULT_SINCE, RETRY_BURST,
    RETRY_INTERVAL,
};
pub use error::{EngineError, Result};
pub use limiter::RetryLimiter;
pub use registry::TailRegistry;
pub use run::{run, tail_stdin};
pub use target::{TargetFilter, TargetFilterConfig};
pub use watch::{list_targets, watch_targets};
