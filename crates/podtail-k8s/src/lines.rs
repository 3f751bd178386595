use futures::io::{AsyncBufRead, AsyncBufReadExt};
use futures::{StreamExt, stream};

use crate::api::{K8sError, LineStream};

/// Split a byte stream into lines
///
/// Lines end at `\n` (a preceding `\r` is dropped) and invalid UTF-8 is
/// replaced rather than failing the stream. A read error ends the stream
/// after being yielded once.
pub fn split_lines<R>(reader: R) -> LineStream
where
    R: AsyncBufRead + Send + 'static,
{
    stream::unfold(Some(Box::pin(reader)), |reader| async move {
        let mut reader = reader?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(decode_line(&buf)), Some(reader))),
            Err(e) => Some((Err(K8sError::from(e)), None)),
        }
    })
    .boxed()
}

/// Strip the line ending and decode lossily
pub fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
