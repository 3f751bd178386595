//! One container's log stream

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use crossterm::style::ContentStyle;
use futures::StreamExt;
use podtail_k8s::{K8sError, LogRequest, PodApi};
use podtail_types::{LogRecord, ResumeRequest, Target};
use tokio_util::sync::CancellationToken;

use crate::color::Palette;
use crate::filter::LineFilter;
use crate::output::Output;
use crate::template::Renderer;
use crate::timestamp::{
    Location, TimestampError, TimestampFormat, format_timestamp, parse_timestamp, remove_subsecond,
    split_log_line,
};

#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error(transparent)]
    Api(#[from] K8sError),
}

/// Per-stream options
#[derive(Clone, Debug, Default)]
pub struct TailOptions {
    /// Prefix each line with its timestamp in this format
    pub timestamps: Option<TimestampFormat>,
    pub location: Location,
    pub since_seconds: Option<i64>,
    pub since_time: Option<DateTime<Utc>>,
    pub tail_lines: Option<i64>,
    pub follow: bool,
    /// Suppress the start and stop markers
    pub only_log_lines: bool,
    pub filter: Arc<LineFilter>,
}

/// Everything tails of one run share
#[derive(Clone)]
pub struct TailContext {
    pub options: TailOptions,
    pub renderer: Arc<dyn Renderer>,
    pub palette: Arc<Palette>,
    pub diff_container: bool,
    pub output: Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailState {
    Created,
    Starting,
    Streaming,
    Closed,
}

struct HandleInner {
    closed: AtomicBool,
    token: CancellationToken,
    output: Output,
    stop_marker: Option<String>,
}

/// Cloneable handle that closes a tail from another task
#[derive(Clone)]
pub struct TailHandle(Arc<HandleInner>);

impl TailHandle {
    /// Stop the stream and print the stop marker. Only the first call has
    /// any effect.
    pub fn close(&self) {
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(marker) = &self.0.stop_marker {
            self.0.output.write_err(marker);
        }
        self.0.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TailHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct Tail {
    api: Arc<dyn PodApi>,
    target: Target,
    options: TailOptions,
    renderer: Arc<dyn Renderer>,
    output: Output,
    pod_color: ContentStyle,
    container_color: ContentStyle,
    highlight: ContentStyle,
    start_marker: Option<String>,
    /// Last seen second and how many lines carried it
    last: Option<(String, usize)>,
    resume: Option<ResumeRequest>,
    state: TailState,
    handle: TailHandle,
}

impl Tail {
    pub fn new(api: Arc<dyn PodApi>, target: Target, ctx: &TailContext) -> Self {
        let (pod_color, container_color) =
            ctx.palette
                .colors_for(&target.pod, &target.container, ctx.diff_container);

        let marker = |sign: &str, style: ContentStyle| {
            format!(
                "{} {} {} › {}\n",
                style.apply(sign),
                pod_color.apply(&target.namespace),
                pod_color.apply(&target.pod),
                container_color.apply(&target.container),
            )
        };
        let (start_marker, stop_marker) = if ctx.options.only_log_lines {
            (None, None)
        } else {
            (
                Some(marker("+", ctx.palette.start_marker())),
                Some(marker("-", ctx.palette.stop_marker())),
            )
        };

        let handle = TailHandle(Arc::new(HandleInner {
            closed: AtomicBool::new(false),
            token: CancellationToken::new(),
            output: ctx.output.clone(),
            stop_marker,
        }));

        Self {
            api,
            target,
            options: ctx.options.clone(),
            renderer: Arc::clone(&ctx.renderer),
            output: ctx.output.clone(),
            pod_color,
            container_color,
            highlight: ctx.palette.highlight(),
            start_marker,
            last: None,
            resume: None,
            state: TailState::Created,
            handle,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn handle(&self) -> TailHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> TailState {
        if self.handle.is_closed() {
            TailState::Closed
        } else {
            self.state
        }
    }

    pub fn close(&self) {
        self.handle.close();
    }

    /// Open the stream and print lines until it ends
    ///
    /// Returns `Ok` on end of stream and when `cancel` fires or the tail is
    /// closed; stream failures are returned as errors.
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<(), TailError> {
        if self.handle.is_closed() {
            return Ok(());
        }
        let closed = self.handle.0.token.clone();
        self.state = TailState::Starting;

        if let Some(marker) = &self.start_marker {
            self.output.write_err(marker);
        }

        let request = LogRequest {
            container: self.target.container.clone(),
            follow: self.options.follow,
            timestamps: true,
            since_seconds: self.options.since_seconds,
            since_time: self.options.since_time,
            tail_lines: self.options.tail_lines,
        };
        tracing::debug!(tail = %self.target, ?request, "opening log stream");

        let mut lines = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = closed.cancelled() => return Ok(()),
            result = self.api.log_lines(&self.target.namespace, &self.target.pod, &request) => result?,
        };
        self.state = TailState::Streaming;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = closed.cancelled() => return Ok(()),
                next = lines.next() => match next {
                    Some(Ok(line)) => self.consume_line(&line),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        tracing::debug!(tail = %self.target, "log stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Reopen the stream from where a previous one stopped
    pub async fn resume(
        &mut self,
        cancel: &CancellationToken,
        request: ResumeRequest,
    ) -> Result<(), TailError> {
        match request.since_time() {
            Ok(since) => {
                self.options.since_time = Some(since);
                self.options.since_seconds = None;
                self.options.tail_lines = None;
                self.resume = Some(request);
            }
            Err(e) => {
                self.output
                    .write_err(&format!("failed to resume: {e}, fallback to start\n"));
            }
        }
        self.start(cancel).await
    }

    /// Where a retry should pick up, once a timestamped line has been seen
    pub fn resume_request(&self) -> Option<ResumeRequest> {
        self.last
            .as_ref()
            .map(|(timestamp, lines)| ResumeRequest::new(timestamp.clone(), *lines))
    }

    fn consume_line(&mut self, line: &str) {
        let Some((timestamp, content)) = split_log_line(line) else {
            self.print(format!("[{}] {line}", TimestampError::Missing));
            return;
        };
        if let Err(e) = parse_timestamp(timestamp) {
            self.print(format!("[{e}] {line}"));
            return;
        }

        // the API resumes on whole seconds
        let second = remove_subsecond(timestamp);
        self.remember_last(&second);
        if self.resume.as_mut().is_some_and(|r| r.should_skip(&second)) {
            return;
        }

        let filter = &self.options.filter;
        if !filter.accepts(content) {
            return;
        }
        let mut message = filter.highlight(content, self.highlight);

        if let Some(format) = &self.options.timestamps {
            match format_timestamp(timestamp, format, self.options.location) {
                Ok(formatted) => message = format!("{formatted} {message}"),
                Err(e) => {
                    self.print(format!("[{e}] {line}"));
                    return;
                }
            }
        }

        self.print(message);
    }

    fn remember_last(&mut self, second: &str) {
        match &mut self.last {
            Some((last, lines)) if last == second => *lines += 1,
            _ => self.last = Some((second.to_string(), 1)),
        }
    }

    fn print(&self, message: String) {
        let record = LogRecord {
            message,
            node_name: self.target.node.clone(),
            namespace: self.target.namespace.clone(),
            pod_name: self.target.pod.clone(),
            container_name: self.target.container.clone(),
            pod_color: self.pod_color,
            container_color: self.container_color,
        };

        match self.renderer.render(&record) {
            Ok(text) => self.output.write_out(&text),
            Err(e) => self
                .output
                .write_err(&format!("expanding template failed: {e}\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Buffer;
    use crate::template::{RenderError, Template};
    use podtail_k8s::fake::{FakePodApi, LogEnd, LogScript};
    use regex::Regex;
    use std::time::Duration;

    const T1: &str = "2023-02-14T05:36:39";
    const T2: &str = "2023-02-14T05:36:40";

    struct Harness {
        api: Arc<FakePodApi>,
        ctx: TailContext,
        out: Buffer,
        err: Buffer,
    }

    fn harness(options: TailOptions) -> Harness {
        let (output, out, err) = Output::buffered();
        let ctx = TailContext {
            options,
            renderer: Arc::new(Template::Raw),
            palette: Arc::new(Palette::default().with_enabled(false)),
            diff_container: false,
            output,
        };
        Harness {
            api: Arc::new(FakePodApi::new()),
            ctx,
            out,
            err,
        }
    }

    impl Harness {
        fn tail(&self) -> Tail {
            let api: Arc<dyn PodApi> = self.api.clone();
            Tail::new(api, Target::new("node1", "ns", "pod", "app"), &self.ctx)
        }

        fn script(&self, lines: &[String], end: LogEnd) {
            self.api
                .push_logs("ns", "pod", "app", LogScript::new(lines.to_vec(), end));
        }
    }

    fn stamped(second: &str, frac: u32, text: &str) -> String {
        format!("{second}.{frac:09}Z {text}")
    }

    #[tokio::test]
    async fn test_start_prints_lines_and_markers() {
        let h = harness(TailOptions::default());
        h.script(
            &[stamped(T1, 1, "hello"), stamped(T1, 2, "world")],
            LogEnd::Eof,
        );

        let mut tail = h.tail();
        tail.start(&CancellationToken::new()).await.unwrap();
        tail.close();
        tail.close();

        assert_eq!(h.out.lines(), ["hello", "world"]);
        assert_eq!(h.err.lines(), ["+ ns pod › app", "- ns pod › app"]);
        assert_eq!(tail.state(), TailState::Closed);

        let calls = h.api.log_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].request.timestamps);
        assert_eq!(calls[0].request.container, "app");
    }

    #[tokio::test]
    async fn test_exclude_drops_matching_lines() {
        let filter = LineFilter::new(vec![], vec![Regex::new("DEBUG").unwrap()], vec![]).unwrap();
        let h = harness(TailOptions {
            filter: Arc::new(filter),
            ..Default::default()
        });
        h.script(
            &[
                stamped(T1, 1, "INFO starting"),
                stamped(T1, 2, "DEBUG noisy"),
                stamped(T2, 1, "INFO ready"),
            ],
            LogEnd::Eof,
        );

        h.tail().start(&CancellationToken::new()).await.unwrap();
        assert_eq!(h.out.lines(), ["INFO starting", "INFO ready"]);
    }

    #[tokio::test]
    async fn test_resume_skips_already_printed_lines() {
        let h = harness(TailOptions {
            since_seconds: Some(172_800),
            tail_lines: Some(10),
            ..Default::default()
        });
        h.script(
            &[
                stamped(T1, 1, "a"),
                stamped(T1, 2, "b"),
                stamped(T2, 1, "c"),
                stamped(T2, 2, "d"),
            ],
            LogEnd::Eof,
        );

        let mut tail = h.tail();
        tail.resume(&CancellationToken::new(), ResumeRequest::new(format!("{T1}Z"), 1))
            .await
            .unwrap();

        assert_eq!(h.out.lines(), ["b", "c", "d"]);

        let request = &h.api.log_calls()[0].request;
        assert_eq!(request.since_seconds, None);
        assert_eq!(request.tail_lines, None);
        assert_eq!(
            request.since_time.map(|t| t.to_rfc3339()),
            Some("2023-02-14T05:36:39+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_resume_request_tracks_last_second() {
        let h = harness(TailOptions::default());
        let mut tail = h.tail();
        assert_eq!(tail.resume_request(), None);

        h.script(
            &[
                stamped(T1, 1, "a"),
                stamped(T1, 2, "b"),
                stamped(T2, 1, "c"),
                stamped(T2, 2, "d"),
            ],
            LogEnd::Eof,
        );
        tail.start(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            tail.resume_request(),
            Some(ResumeRequest::new(format!("{T2}Z"), 2))
        );
    }

    #[tokio::test]
    async fn test_resume_with_bad_timestamp_falls_back() {
        let h = harness(TailOptions {
            since_seconds: Some(60),
            ..Default::default()
        });
        h.script(&[stamped(T1, 1, "a")], LogEnd::Eof);

        let mut tail = h.tail();
        tail.resume(&CancellationToken::new(), ResumeRequest::new("yesterday", 1))
            .await
            .unwrap();

        assert!(h.err.lines()[0].starts_with("failed to resume: "));
        assert!(h.err.lines()[0].ends_with(", fallback to start"));
        assert_eq!(h.out.lines(), ["a"]);
        assert_eq!(h.api.log_calls()[0].request.since_seconds, Some(60));
    }

    #[tokio::test]
    async fn test_missing_timestamp_is_reported_inline() {
        let h = harness(TailOptions::default());
        h.script(&["garbage".to_string()], LogEnd::Eof);

        let mut tail = h.tail();
        tail.start(&CancellationToken::new()).await.unwrap();

        assert_eq!(h.out.lines(), ["[missing timestamp] garbage"]);
        assert_eq!(tail.resume_request(), None);
    }

    #[tokio::test]
    async fn test_invalid_timestamp_keeps_resume_point() {
        let h = harness(TailOptions::default());
        h.script(
            &[stamped(T1, 1, "good"), "not-a-time oops".to_string()],
            LogEnd::Eof,
        );

        let mut tail = h.tail();
        tail.start(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            h.out.lines(),
            ["good", "[invalid timestamp \"not-a-time\"] not-a-time oops"]
        );
        assert_eq!(
            tail.resume_request(),
            Some(ResumeRequest::new(format!("{T1}Z"), 1))
        );
    }

    #[tokio::test]
    async fn test_timestamps_prefix() {
        let h = harness(TailOptions {
            timestamps: Some(TimestampFormat::Default),
            location: Location::Utc,
            only_log_lines: true,
            ..Default::default()
        });
        h.script(
            &[stamped(T1, 5, "hello"), "bad-stamp hello".to_string()],
            LogEnd::Eof,
        );

        h.tail().start(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            h.out.lines(),
            [
                "2023-02-14T05:36:39.000000005Z hello",
                "[invalid timestamp \"bad-stamp\"] bad-stamp hello"
            ]
        );
        assert!(h.err.contents().is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_is_returned() {
        let h = harness(TailOptions::default());
        h.script(&[stamped(T1, 1, "a")], LogEnd::Error("connection reset".to_string()));

        let err = h.tail().start(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(h.out.lines(), ["a"]);
    }

    #[tokio::test]
    async fn test_close_stops_pending_stream() {
        let h = harness(TailOptions {
            follow: true,
            ..Default::default()
        });
        h.script(&[stamped(T1, 1, "a")], LogEnd::Pending);

        let mut tail = h.tail();
        let handle = tail.handle();
        let task = tokio::spawn(async move { tail.start(&CancellationToken::new()).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(h.err.lines(), ["+ ns pod › app", "- ns pod › app"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_stream() {
        let h = harness(TailOptions::default());
        h.script(&[], LogEnd::Pending);

        let cancel = CancellationToken::new();
        let mut tail = h.tail();
        let child = cancel.clone();
        let task = tokio::spawn(async move { tail.start(&child).await });
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    struct Failing;

    impl Renderer for Failing {
        fn render(&self, _record: &LogRecord) -> Result<String, RenderError> {
            Err(RenderError::Format(std::fmt::Error))
        }
    }

    #[tokio::test]
    async fn test_render_failure_is_reported() {
        let mut h = harness(TailOptions {
            only_log_lines: true,
            ..Default::default()
        });
        h.ctx.renderer = Arc::new(Failing);
        h.script(&[stamped(T1, 1, "a")], LogEnd::Eof);

        h.tail().start(&CancellationToken::new()).await.unwrap();

        assert!(h.out.contents().is_empty());
        assert!(h.err.lines()[0].starts_with("expanding template failed: "));
    }
}
