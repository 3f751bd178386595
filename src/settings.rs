//! Config file loading and turning arguments into an engine `Config`

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use podtail_engine::{Config, DEFAULT_MAX_LOG_REQUESTS, DEFAULT_MAX_LOG_REQUESTS_BATCH, DEFAULT_SINCE};
use podtail_k8s::ResourceRef;
use podtail_logs::{
    CustomTemplate, LineFilter, Location, Output, Palette, Template, TimestampFormat,
};
use podtail_types::{Condition, ContainerState};
use regex::Regex;
use serde::Deserialize;

use crate::cli::{Args, ColorMode};

/// Values read from the config file. Keys are the long flag names.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub namespace: Vec<String>,
    pub all_namespaces: Option<bool>,
    pub container: Option<String>,
    pub exclude_container: Vec<String>,
    pub exclude_pod: Vec<String>,
    pub exclude: Vec<String>,
    pub include: Vec<String>,
    pub highlight: Vec<String>,
    pub selector: Option<String>,
    pub field_selector: Option<String>,
    pub since: Option<String>,
    pub tail: Option<i64>,
    pub timestamps: Option<String>,
    pub timezone: Option<String>,
    pub no_follow: Option<bool>,
    pub max_log_requests: Option<usize>,
    pub container_state: Vec<String>,
    pub condition: Option<String>,
    pub init_containers: Option<bool>,
    pub ephemeral_containers: Option<bool>,
    pub output: Option<String>,
    pub template: Option<String>,
    pub color: Option<ColorMode>,
    pub pod_colors: Vec<String>,
    pub container_colors: Vec<String>,
    pub diff_container: Option<bool>,
    pub only_log_lines: Option<bool>,
    pub context: Option<String>,
    pub kubeconfig: Option<PathBuf>,
}

impl FileConfig {
    /// Read the explicit config file, or the default one when it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }
}

/// `$XDG_CONFIG_HOME/podtail/config.toml`, falling back to `~/.config`
fn default_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("podtail").join("config.toml"))
}

fn fill<T>(flag: &mut Option<T>, file: Option<T>) {
    if flag.is_none() {
        *flag = file;
    }
}

fn fill_list(flag: &mut Vec<String>, file: Vec<String>) {
    if flag.is_empty() {
        *flag = file;
    }
}

impl Args {
    /// Apply file values to everything not given on the command line
    pub fn merge(&mut self, file: FileConfig) {
        fill_list(&mut self.namespace, file.namespace);
        self.all_namespaces |= file.all_namespaces.unwrap_or(false);
        fill(&mut self.container, file.container);
        fill_list(&mut self.exclude_container, file.exclude_container);
        fill_list(&mut self.exclude_pod, file.exclude_pod);
        fill_list(&mut self.exclude, file.exclude);
        fill_list(&mut self.include, file.include);
        fill_list(&mut self.highlight, file.highlight);
        fill(&mut self.selector, file.selector);
        fill(&mut self.field_selector, file.field_selector);
        fill(&mut self.since, file.since);
        fill(&mut self.tail, file.tail);
        fill(&mut self.timestamps, file.timestamps);
        fill(&mut self.timezone, file.timezone);
        self.no_follow |= file.no_follow.unwrap_or(false);
        fill(&mut self.max_log_requests, file.max_log_requests);
        fill_list(&mut self.container_state, file.container_state);
        fill(&mut self.condition, file.condition);
        fill(&mut self.init_containers, file.init_containers);
        fill(&mut self.ephemeral_containers, file.ephemeral_containers);
        fill(&mut self.output, file.output);
        fill(&mut self.template, file.template);
        fill(&mut self.color, file.color);
        fill_list(&mut self.pod_colors, file.pod_colors);
        fill_list(&mut self.container_colors, file.container_colors);
        self.diff_container |= file.diff_container.unwrap_or(false);
        self.only_log_lines |= file.only_log_lines.unwrap_or(false);
        fill(&mut self.context, file.context);
        fill(&mut self.kubeconfig, file.kubeconfig);
    }
}

/// Parse a duration such as `1h30m`, `45s`, `2days` or `1.5h`
///
/// Fractional values follow Go's `time.ParseDuration`, everything else goes
/// through humantime.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.contains('.') {
        return parse_fractional(s).with_context(|| format!("invalid duration {input:?}"));
    }
    humantime::parse_duration(s).with_context(|| format!("invalid duration {input:?}"))
}

fn parse_fractional(s: &str) -> Result<Duration> {
    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse()?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let seconds = match unit {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => bail!("missing unit"),
            other => bail!("unknown unit {other:?}"),
        };
        total += value * seconds;
        rest = next;
    }
    Ok(Duration::from_secs_f64(total))
}

fn compile(pattern: &str, what: &str) -> Result<Regex> {
    Regex::new(pattern)
        .with_context(|| format!("failed to compile regular expression for {what}"))
}

fn compile_all(patterns: &[String], what: &str) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p, what)).collect()
}

/// Reject selectors with empty requirements such as `a=b,,c=d`
fn check_selector(selector: &str, what: &str) -> Result<()> {
    let broken = selector
        .split(',')
        .map(str::trim)
        .any(|req| req.is_empty() || req.starts_with('='));
    if broken {
        bail!("failed to parse {what} {selector:?}");
    }
    Ok(())
}

fn unique(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items.iter().filter(|item| !item.is_empty()) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// Validate every argument and build the engine configuration
pub fn build_config(args: &Args, output: Output) -> Result<Config> {
    let mut resource = None;
    let pod_query = match args.query.as_deref() {
        Some(query) if query.contains('/') => {
            let parsed: ResourceRef = query
                .parse()
                .context("failed to parse resource query")?;
            resource = Some(parsed);
            compile(".*", "query")?
        }
        Some(query) => compile(query, "query")?,
        None => {
            if args.selector.is_none() && args.field_selector.is_none() && !args.stdin {
                bail!("one of pod-query, --selector, --field-selector or --stdin is required");
            }
            compile(".*", "query")?
        }
    };

    let container_query = compile(args.container.as_deref().unwrap_or(".*"), "container query")?;
    let mut config = Config::new(pod_query, container_query, output);

    config.namespaces = unique(&args.namespace);
    config.all_namespaces = args.all_namespaces;
    config.resource = resource;
    config.exclude_pod_query = compile_all(&args.exclude_pod, "excluded pod query")?;
    config.exclude_container_query =
        compile_all(&args.exclude_container, "excluded container query")?;

    if !args.container_state.is_empty() {
        config.container_states = unique(&args.container_state)
            .iter()
            .map(|state| state.parse::<ContainerState>())
            .collect::<Result<_, _>>()?;
    }
    config.condition = args
        .condition
        .as_deref()
        .map(str::parse::<Condition>)
        .transpose()?;
    config.init_containers = args.init_containers.unwrap_or(true);
    config.ephemeral_containers = args.ephemeral_containers.unwrap_or(true);

    if let Some(selector) = &args.selector {
        check_selector(selector, "label selector")?;
    }
    if let Some(selector) = &args.field_selector {
        check_selector(selector, "field selector")?;
    }
    config.label_selector = args.selector.clone();
    config.field_selector = args.field_selector.clone();

    let since = match &args.since {
        Some(since) => parse_duration(since)?,
        None => DEFAULT_SINCE,
    };
    config.follow = !args.no_follow;
    config.max_log_requests = args.max_log_requests.unwrap_or(if config.follow {
        DEFAULT_MAX_LOG_REQUESTS
    } else {
        DEFAULT_MAX_LOG_REQUESTS_BATCH
    });

    let filter = LineFilter::new(
        compile_all(&args.include, "inclusion filter")?,
        compile_all(&args.exclude, "exclusion filter")?,
        compile_all(&args.highlight, "highlight filter")?,
    )
    .context("failed to compile highlight expression")?;

    config.tail.timestamps = args
        .timestamps
        .as_deref()
        .map(str::parse::<TimestampFormat>)
        .transpose()?;
    config.tail.location = match &args.timezone {
        Some(zone) => zone.parse::<Location>()?,
        None => Location::Local,
    };
    config.tail.since_seconds = Some(since.as_secs() as i64);
    config.tail.tail_lines = args.tail.filter(|lines| *lines >= 0);
    config.tail.follow = config.follow;
    config.tail.only_log_lines = args.only_log_lines;
    config.tail.filter = Arc::new(filter);

    let colored = match args.color.unwrap_or_default() {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => std::io::stdout().is_terminal(),
    };
    let palette = if args.pod_colors.is_empty() && args.container_colors.is_empty() {
        Palette::default()
    } else {
        Palette::from_sgr(&args.pod_colors, &args.container_colors)?
    };
    config.palette = palette.with_enabled(colored);
    config.diff_container = args.diff_container;

    let show_namespace = args.all_namespaces || config.namespaces.len() > 1;
    config.template = match &args.template {
        Some(template) => {
            let custom: CustomTemplate = template.parse().context("unable to parse template")?;
            Arc::new(Template::Custom(custom))
        }
        None => Arc::new(Template::from_output(
            args.output.as_deref().unwrap_or("default"),
            show_namespace,
        )?),
    };
    config.stdin = args.stdin;

    Ok(config)
}
