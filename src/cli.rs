use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

/// Podtail - tail logs from many pods and containers at once
#[derive(Parser, Debug, Default)]
#[command(name = "podtail")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pod name (regular expression), or <kind>/<name> such as deploy/web
    #[arg(value_name = "POD_QUERY")]
    pub query: Option<String>,

    /// Namespaces to tail, repeat or separate with commas. Defaults to the
    /// namespace of the current context.
    #[arg(short, long, value_delimiter = ',')]
    pub namespace: Vec<String>,

    /// Tail across all namespaces, ignoring --namespace
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Container name (regular expression)
    #[arg(short, long)]
    pub container: Option<String>,

    /// Container names to exclude (regular expression)
    #[arg(short = 'E', long)]
    pub exclude_container: Vec<String>,

    /// Pod names to exclude (regular expression)
    #[arg(long)]
    pub exclude_pod: Vec<String>,

    /// Log lines to exclude (regular expression)
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Log lines to include (regular expression)
    #[arg(short, long)]
    pub include: Vec<String>,

    /// Log lines to highlight (regular expression)
    #[arg(short = 'H', long)]
    pub highlight: Vec<String>,

    /// Label selector to filter pods on
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    /// Field selector to filter pods on
    #[arg(long)]
    pub field_selector: Option<String>,

    /// Only return logs newer than a relative duration such as 5s, 2m or 3h [default: 48h]
    #[arg(short, long)]
    pub since: Option<String>,

    /// Lines from the end of the logs to show, -1 for all [default: -1]
    #[arg(long, allow_negative_numbers = true)]
    pub tail: Option<i64>,

    /// Print timestamps: default, short or a strftime pattern
    #[arg(
        short,
        long,
        value_name = "FORMAT",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "default"
    )]
    pub timestamps: Option<String>,

    /// Time zone for timestamps: Local, UTC, a zone name such as Asia/Tokyo or an offset
    /// such as +09:00 [default: Local]
    #[arg(long)]
    pub timezone: Option<String>,

    /// Print the logs that exist now and exit
    #[arg(long)]
    pub no_follow: bool,

    /// Maximum concurrent log requests [default: 50, or 5 with --no-follow]
    #[arg(long)]
    pub max_log_requests: Option<usize>,

    /// Container states to tail: running, waiting, terminated or all
    #[arg(long, value_delimiter = ',')]
    pub container_state: Vec<String>,

    /// Only tail pods with this condition, e.g. ready or ready=false
    #[arg(long)]
    pub condition: Option<String>,

    /// Include init containers [default: true]
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub init_containers: Option<bool>,

    /// Include ephemeral containers [default: true]
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub ephemeral_containers: Option<bool>,

    /// Output format: default, raw or json
    #[arg(short, long)]
    pub output: Option<String>,

    /// Line template such as "{{ podName }} {{ message }}", overrides --output
    #[arg(long)]
    pub template: Option<String>,

    /// When to colorize output [default: auto]
    #[arg(long, value_enum)]
    pub color: Option<ColorMode>,

    /// Pod colors as SGR sequences, e.g. 91,92,93
    #[arg(long, value_delimiter = ',')]
    pub pod_colors: Vec<String>,

    /// Container colors as SGR sequences, one per pod color
    #[arg(long, value_delimiter = ',')]
    pub container_colors: Vec<String>,

    /// Color containers independently of their pod
    #[arg(long)]
    pub diff_container: bool,

    /// Suppress the start and stop markers
    #[arg(long)]
    pub only_log_lines: bool,

    /// Read log lines from stdin instead of a cluster
    #[arg(long)]
    pub stdin: bool,

    /// Kubernetes context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Config file [default: ~/.config/podtail/config.toml]
    #[arg(long, env = "PODTAIL_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Colorize when stdout is a terminal
    #[default]
    Auto,
    Always,
    Never,
}
