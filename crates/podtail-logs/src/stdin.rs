use std::sync::Arc;

use crossterm::style::ContentStyle;
use podtail_k8s::decode_line;
use podtail_types::LogRecord;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::filter::LineFilter;
use crate::output::Output;
use crate::template::Renderer;

/// Filters and renders lines read from a local stream instead of a pod
pub struct StdinTail {
    filter: Arc<LineFilter>,
    renderer: Arc<dyn Renderer>,
    output: Output,
    highlight: ContentStyle,
}

impl StdinTail {
    pub fn new(
        filter: Arc<LineFilter>,
        renderer: Arc<dyn Renderer>,
        output: Output,
        highlight: ContentStyle,
    ) -> Self {
        Self {
            filter,
            renderer,
            output,
            highlight,
        }
    }

    /// Consume `reader` until end of input or cancellation
    pub async fn run<R>(&self, reader: R, cancel: &CancellationToken) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.split(b'\n');
        loop {
            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                raw = lines.next_segment() => raw?,
            };
            let Some(raw) = raw else {
                return Ok(());
            };
            self.consume_line(&decode_line(&raw));
        }
    }

    fn consume_line(&self, line: &str) {
        if !self.filter.accepts(line) {
            return;
        }
        let record = LogRecord {
            message: self.filter.highlight(line, self.highlight),
            ..Default::default()
        };
        match self.renderer.render(&record) {
            Ok(text) => self.output.write_out(&text),
            Err(e) => self
                .output
                .write_err(&format!("expanding template failed: {e}\n")),
        }
    }
}
