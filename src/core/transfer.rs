use crate::core::connection::with_timeout;
use crate::core::protocol::{is_sentinel_line, EchoReceipt, LineReader, SENTINEL};
use crate::domain::error::{EchoLineError, EchoLineResult, TransferStage};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Client-side transfer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferState {
    Connecting,
    Streaming,
    Finalizing,
    Closed,
    Failed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferState::Connecting => write!(f, "Connecting"),
            TransferState::Streaming => write!(f, "Streaming"),
            TransferState::Finalizing => write!(f, "Finalizing"),
            TransferState::Closed => write!(f, "Closed"),
            TransferState::Failed => write!(f, "Failed"),
        }
    }
}

/// Counters collected while streaming lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub lines: u64,
    pub bytes_sent: u64,
    /// Source lines identical to the end-of-transfer record
    pub sentinel_collisions: u64,
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub file: String,
    pub remote: String,
    pub lines: u64,
    pub bytes_sent: u64,
    pub sentinel_collisions: u64,
    pub echoed_bytes: u64,
    pub sentinel_echoed: bool,
    pub elapsed_us: u128,
    #[serde(skip)]
    pub echo: Option<Vec<u8>>,
}

/// Writes every line from `lines` to `writer`, one write per line, followed by
/// a single write of [`SENTINEL`].
pub async fn stream_lines<R, W>(
    lines: &mut LineReader<R>,
    writer: &mut W,
    write_timeout: Option<Duration>,
) -> EchoLineResult<StreamStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = StreamStats::default();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => return Err(EchoLineError::transfer(TransferStage::Reading, e)),
        };

        if is_sentinel_line(line) {
            stats.sentinel_collisions += 1;
            warn!(
                line = stats.lines + 1,
                "Source line matches the end-of-transfer record; receivers cannot tell them apart"
            );
        }

        with_timeout(write_timeout, writer.write_all(line))
            .await
            .map_err(|e| EchoLineError::transfer(TransferStage::Writing, e))?;

        stats.lines += 1;
        stats.bytes_sent += line.len() as u64;
    }

    with_timeout(write_timeout, writer.write_all(SENTINEL))
        .await
        .map_err(|e| EchoLineError::transfer(TransferStage::Writing, e))?;
    stats.bytes_sent += SENTINEL.len() as u64;

    debug!(lines = stats.lines, bytes = stats.bytes_sent, "Streamed file and sentinel");
    Ok(stats)
}

/// Flush queued bytes, then close the write direction
pub async fn finalize<W>(writer: &mut W, write_timeout: Option<Duration>) -> EchoLineResult<()>
where
    W: AsyncWrite + Unpin,
{
    with_timeout(write_timeout, writer.flush())
        .await
        .map_err(|e| EchoLineError::transfer(TransferStage::Finalizing, e))?;
    with_timeout(write_timeout, writer.shutdown())
        .await
        .map_err(|e| EchoLineError::transfer(TransferStage::Finalizing, e))
}

/// Read whatever the remote sends back until it closes its side
pub async fn drain_echo<R>(reader: &mut R, receipt: &mut EchoReceipt) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        receipt.record(&buffer[..n]);
    }
}
