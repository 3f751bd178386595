use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Destination for rendered log lines and for markers and notices
///
/// Clones share the underlying writers, so whole records from concurrent
/// tails never interleave.
#[derive(Clone)]
pub struct Output {
    out: SharedWriter,
    err: SharedWriter,
}

impl Output {
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
            err: Arc::new(Mutex::new(Box::new(err))),
        }
    }

    /// Process stdout and stderr
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// In-memory sinks, returned alongside handles to read them back
    pub fn buffered() -> (Self, Buffer, Buffer) {
        let out = Buffer::default();
        let err = Buffer::default();
        (Self::new(out.clone(), err.clone()), out, err)
    }

    /// Write a rendered record
    pub fn write_out(&self, text: &str) {
        write_locked(&self.out, text);
    }

    /// Write a marker or notice line
    pub fn write_err(&self, text: &str) {
        write_locked(&self.err, text);
    }
}

fn write_locked(writer: &SharedWriter, text: &str) {
    let mut writer = writer.lock();
    if let Err(e) = writer.write_all(text.as_bytes()).and_then(|_| writer.flush()) {
        tracing::debug!(error = %e, "failed to write output");
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output").finish_non_exhaustive()
    }
}

/// Growable in-memory writer with shared contents
#[derive(Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Buffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_output() {
        let (output, out, err) = Output::buffered();
        output.write_out("line one\n");
        output.clone().write_out("line two\n");
        output.write_err("+ ns pod › app\n");

        assert_eq!(out.lines(), ["line one", "line two"]);
        assert_eq!(err.contents(), "+ ns pod › app\n");
    }
}
