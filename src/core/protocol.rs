//! Wire-level pieces of the transfer protocol.
//!
//! The stream carries no framing. A transfer is the file's lines in order,
//! followed by a single [`SENTINEL`] record. The echo side attaches no
//! meaning to any of it.

use crate::domain::config::LineEndings;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// End-of-transfer record appended once by the client
pub const SENTINEL: &[u8] = b"--over--\n";

/// Sentinel body without its terminator
const SENTINEL_BODY: &[u8] = b"--over--";

/// Returns true when a line read from the source is indistinguishable from
/// the end-of-transfer record. Such lines are sent unescaped.
///
/// Only a terminated line can collide: an unterminated final `--over--` is
/// followed on the wire by the real record and never reads as one.
pub fn is_sentinel_line(line: &[u8]) -> bool {
    line.ends_with(b"\n") && strip_terminator(line) == SENTINEL_BODY
}

/// Line content without a trailing `\n` or `\r\n`
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Lazy, finite sequence of raw lines over an async reader.
///
/// Each yielded line keeps its terminator unless the reader was built with
/// [`LineEndings::Normalize`], in which case every line ends with a single `\n`.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    endings: LineEndings,
    lines_read: u64,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R, endings: LineEndings) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
            endings,
            lines_read: 0,
        }
    }

    /// Next line, or `None` once the source is exhausted
    pub async fn next_line(&mut self) -> std::io::Result<Option<&[u8]>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if self.endings == LineEndings::Normalize {
            let content_len = strip_terminator(&self.buf).len();
            self.buf.truncate(content_len);
            self.buf.push(b'\n');
        }

        self.lines_read += 1;
        Ok(Some(&self.buf))
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

/// What the client observed coming back on its connection
#[derive(Debug, Default)]
pub struct EchoReceipt {
    total: u64,
    captured: Option<Vec<u8>>,
    tail: Vec<u8>,
}

impl EchoReceipt {
    pub fn new(capture: bool) -> Self {
        Self {
            total: 0,
            captured: capture.then(Vec::new),
            tail: Vec::with_capacity(SENTINEL.len()),
        }
    }

    pub fn record(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        if let Some(captured) = self.captured.as_mut() {
            captured.extend_from_slice(chunk);
        }

        // Only the last SENTINEL.len() bytes matter for completion
        self.tail.extend_from_slice(chunk);
        if self.tail.len() > SENTINEL.len() {
            let excess = self.tail.len() - SENTINEL.len();
            self.tail.drain(..excess);
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// True once the echoed stream ends with the end-of-transfer record
    pub fn ends_with_sentinel(&self) -> bool {
        self.tail == SENTINEL
    }

    pub fn into_captured(self) -> Option<Vec<u8>> {
        self.captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    async fn collect_lines(input: &[u8], endings: LineEndings) -> Vec<Vec<u8>> {
        let mut reader = LineReader::new(input, endings);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line.to_vec());
        }
        assert_eq!(reader.lines_read(), lines.len() as u64);
        lines
    }

    #[test]
    fn test_sentinel_line_detection() {
        assert!(is_sentinel_line(b"--over--\n"));
        assert!(is_sentinel_line(b"--over--\r\n"));
        assert!(!is_sentinel_line(b"--over--"));
        assert!(!is_sentinel_line(b"--over--x\n"));
        assert!(!is_sentinel_line(b" --over--\n"));
        assert!(!is_sentinel_line(b"\n"));
    }

    #[tokio::test]
    async fn test_preserve_keeps_exact_bytes() {
        let lines = collect_lines(b"hello\r\nworld\nlast", LineEndings::Preserve).await;
        assert_eq!(
            lines,
            vec![b"hello\r\n".to_vec(), b"world\n".to_vec(), b"last".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_normalize_rewrites_terminators() {
        let lines = collect_lines(b"hello\r\nworld\nlast", LineEndings::Normalize).await;
        assert_eq!(
            lines,
            vec![b"hello\n".to_vec(), b"world\n".to_vec(), b"last\n".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_empty_source_yields_nothing() {
        assert!(collect_lines(b"", LineEndings::Preserve).await.is_empty());
    }

    #[test]
    fn test_receipt_tracks_sentinel_across_chunks() {
        let mut receipt = EchoReceipt::new(true);
        receipt.record(b"hello\nworld\n--ov");
        assert!(!receipt.ends_with_sentinel());
        receipt.record(b"er--\n");
        assert!(receipt.ends_with_sentinel());
        assert_eq!(receipt.total_bytes(), 21);
        assert_eq!(
            receipt.into_captured().unwrap(),
            b"hello\nworld\n--over--\n".to_vec()
        );
    }

    #[test]
    fn test_receipt_without_capture() {
        let mut receipt = EchoReceipt::new(false);
        receipt.record(SENTINEL);
        assert!(receipt.ends_with_sentinel());
        assert!(receipt.into_captured().is_none());
    }

    proptest! {
        #[test]
        fn prop_preserved_lines_concatenate_to_input(
            input in proptest::collection::vec(any::<u8>(), 0..2048)
        ) {
            let lines = tokio_test::block_on(collect_lines(&input, LineEndings::Preserve));
            let rejoined: Vec<u8> = lines.concat();
            prop_assert_eq!(&rejoined, &input);

            let newlines = input.iter().filter(|b| **b == b'\n').count();
            let unterminated_tail = !input.is_empty() && input.last() != Some(&b'\n');
            let expected = newlines + usize::from(unterminated_tail);
            prop_assert_eq!(lines.len(), expected);
        }
    }
}
