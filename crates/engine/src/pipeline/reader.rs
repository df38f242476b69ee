use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use super::metrics::PipelineMetrics;

/// Newline-delimited line decoder over any async byte source.
///
/// Lines may be longer than the internal buffer; `read_until` keeps
/// appending across refills. The trailing `\n` (and a preceding `\r`) is
/// stripped and invalid UTF-8 is replaced rather than rejected.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            inner: BufReader::new(source),
            buf: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize, source: R) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity, source),
            buf: Vec::new(),
        }
    }

    /// Next line, or `None` at end of stream. The returned byte count is the
    /// raw size including the line terminator.
    pub async fn next_line(&mut self) -> io::Result<Option<(String, usize)>> {
        self.buf.clear();
        let n = self.inner.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(Some((String::from_utf8_lossy(&self.buf).into_owned(), n)))
    }
}

/// Read `source` to the end, publishing every line on `lines`.
///
/// Stops early, without error, when the receiving side is gone. Returns the
/// number of lines published.
pub(crate) async fn read_lines<R>(
    source: R,
    lines: mpsc::Sender<String>,
    metrics: Arc<PipelineMetrics>,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = LineReader::new(source);
    let mut published = 0u64;

    while let Some((line, bytes)) = reader.next_line().await? {
        metrics.record_line(bytes as u64);
        if lines.send(line).await.is_err() {
            tracing::debug!(published, "line consumer closed, stopping reader");
            break;
        }
        published += 1;
    }
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn all_lines<R: AsyncRead + Unpin>(mut reader: LineReader<R>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some((line, _)) = reader.next_line().await.unwrap() {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn test_lines_longer_than_buffer() {
        let long = "x".repeat(100);
        let input = format!("{long}\nshort\n");
        let reader = LineReader::with_capacity(8, input.as_bytes());

        assert_eq!(all_lines(reader).await, vec![long, "short".to_string()]);
    }

    #[tokio::test]
    async fn test_crlf_and_missing_final_newline() {
        let reader = LineReader::new(&b"a\r\nb\n\nc"[..]);
        assert_eq!(all_lines(reader).await, vec!["a", "b", "", "c"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let reader = LineReader::new(&b"ok\xff\n"[..]);
        assert_eq!(all_lines(reader).await, vec!["ok\u{fffd}"]);
    }

    #[tokio::test]
    async fn test_byte_count_includes_terminator() {
        let mut reader = LineReader::new(&b"abc\r\n"[..]);
        let (line, bytes) = reader.next_line().await.unwrap().unwrap();
        assert_eq!(line, "abc");
        assert_eq!(bytes, 5);
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let source = tokio_test::io::Builder::new()
            .read(b"10.0.0.1 [1/Ja")
            .read(b"n/2024]\n10.0.0.2")
            .read(b" [2/Jan/2024]\n")
            .build();
        let reader = LineReader::new(source);

        assert_eq!(
            all_lines(reader).await,
            vec!["10.0.0.1 [1/Jan/2024]", "10.0.0.2 [2/Jan/2024]"]
        );
    }

    #[tokio::test]
    async fn test_read_lines_publishes_and_counts() {
        let (tx, mut rx) = mpsc::channel(8);
        let metrics = Arc::new(PipelineMetrics::new());

        let published = read_lines(&b"a\nbb\n"[..], tx, metrics.clone()).await.unwrap();
        assert_eq!(published, 2);
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("bb"));
        assert_eq!(rx.recv().await, None);

        let snap = metrics.snapshot();
        assert_eq!(snap.lines_read, 2);
        assert_eq!(snap.bytes_read, 5);
    }

    #[tokio::test]
    async fn test_read_lines_surfaces_io_error() {
        let source = tokio_test::io::Builder::new()
            .read(b"first\n")
            .read_error(io::Error::new(io::ErrorKind::Other, "disk gone"))
            .build();
        let (tx, mut rx) = mpsc::channel(8);

        let err = read_lines(source, tx, Arc::new(PipelineMetrics::new()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk gone");
        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_lines_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let published = read_lines(&b"a\nb\n"[..], tx, Arc::new(PipelineMetrics::new()))
            .await
            .unwrap();
        assert_eq!(published, 0);
    }
}
