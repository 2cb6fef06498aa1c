use crate::core::connection::with_timeout;
use crate::core::protocol::{EchoReceipt, LineReader};
use crate::core::transfer::{
    drain_echo, finalize, stream_lines, StreamStats, TransferReport, TransferState,
};
use crate::domain::config::ClientConfig;
use crate::domain::error::{EchoLineError, EchoLineResult, TransferStage};
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Streams a local file to a remote echo service, line by line, then signals
/// completion with the end-of-transfer record.
///
/// A client performs one transfer. Afterwards the connection is released and
/// [`TransferClient::state`] reports `Closed` or `Failed`.
pub struct TransferClient {
    stream: Option<TcpStream>,
    config: ClientConfig,
    state: TransferState,
}

impl TransferClient {
    /// Open the connection. Fails with [`EchoLineError::Connect`] when the
    /// remote is unreachable or refuses.
    pub async fn connect(config: &ClientConfig) -> EchoLineResult<Self> {
        config.validate()?;
        let addr = config.remote_addr();
        debug!("Connecting to {}", addr);

        let stream = with_timeout(
            config.connect_timeout(),
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|source| EchoLineError::Connect {
            addr: addr.clone(),
            source,
        })?;

        if config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        info!("TCP connection established to {}", addr);

        Ok(Self {
            stream: Some(stream),
            config: config.clone(),
            state: TransferState::Connecting,
        })
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Remote address while the connection is still open
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.as_ref().and_then(|stream| stream.peer_addr().ok())
    }

    /// Stream `path` to the remote and close the connection.
    ///
    /// The connection is released on every path; on failure a best-effort
    /// shutdown runs before the error is returned.
    pub async fn transfer(&mut self, path: impl AsRef<Path>) -> EchoLineResult<TransferReport> {
        if self.state != TransferState::Connecting {
            return Err(EchoLineError::InvalidInput(format!("transfer already {}", self.state)));
        }

        let path = path.as_ref();
        let started = Instant::now();
        let remote = self.config.remote_addr();
        let mut receipt = EchoReceipt::new(self.config.capture_echo);

        let result = self.run(path, &mut receipt).await;
        let stream = self.stream.take();

        match result {
            Ok(stats) => {
                drop(stream);
                self.state = TransferState::Closed;
                let elapsed_us = started.elapsed().as_micros();
                info!(
                    file = %path.display(),
                    lines = stats.lines,
                    bytes = stats.bytes_sent,
                    elapsed_us,
                    "Transfer complete"
                );

                Ok(TransferReport {
                    file: path.display().to_string(),
                    remote,
                    lines: stats.lines,
                    bytes_sent: stats.bytes_sent,
                    sentinel_collisions: stats.sentinel_collisions,
                    echoed_bytes: receipt.total_bytes(),
                    sentinel_echoed: receipt.ends_with_sentinel(),
                    elapsed_us,
                    echo: receipt.into_captured(),
                })
            }
            Err(e) => {
                self.state = TransferState::Failed;
                warn!("Transfer to {} failed: {}", remote, e);
                if let Some(mut stream) = stream {
                    if let Err(close_err) = stream.shutdown().await {
                        debug!("Best-effort shutdown after failure: {}", close_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn run(&mut self, path: &Path, receipt: &mut EchoReceipt) -> EchoLineResult<StreamStats> {
        let file = File::open(path)
            .await
            .map_err(|e| EchoLineError::transfer(TransferStage::Reading, e))?;
        let mut lines = LineReader::new(BufReader::new(file), self.config.line_endings);

        let write_timeout = self.config.write_timeout();
        let echo_timeout = self.config.echo_timeout();
        let stream = self.stream.as_mut().ok_or_else(|| {
            EchoLineError::InvalidInput("connection already released".to_string())
        })?;
        let (mut reader, mut writer) = stream.split();
        self.state = TransferState::Streaming;

        // The file flows out sequentially; echoed bytes are drained alongside
        // so neither side's socket buffer fills up and stalls the other.
        let drain = with_timeout(echo_timeout, drain_echo(&mut reader, receipt));
        tokio::pin!(drain);
        let mut drained = false;

        let stats = alongside(
            stream_lines(&mut lines, &mut writer, write_timeout),
            &mut drain,
            &mut drained,
        )
        .await?;

        self.state = TransferState::Finalizing;
        alongside(finalize(&mut writer, write_timeout), &mut drain, &mut drained).await?;

        if !drained {
            drain.await.map_err(echo_error)?;
        }
        Ok(stats)
    }
}

fn echo_error(e: io::Error) -> EchoLineError {
    EchoLineError::transfer(TransferStage::Finalizing, e)
}

/// Drive `step` to completion while polling the echo drain until it finishes
async fn alongside<T, D>(
    step: impl Future<Output = EchoLineResult<T>>,
    drain: &mut Pin<&mut D>,
    drained: &mut bool,
) -> EchoLineResult<T>
where
    D: Future<Output = io::Result<()>>,
{
    tokio::pin!(step);
    loop {
        tokio::select! {
            result = &mut step => return result,
            result = drain.as_mut(), if !*drained => {
                result.map_err(echo_error)?;
                *drained = true;
            }
        }
    }
}

/// Connect to `config`'s remote and stream `path` in one call
pub async fn transfer(
    config: &ClientConfig,
    path: impl AsRef<Path>,
) -> EchoLineResult<TransferReport> {
    let mut client = TransferClient::connect(config).await?;
    client.transfer(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config_for(port: u16) -> ClientConfig {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_ms: Some(1000),
            ..ClientConfig::default()
        }
    }

    async fn spawn_echo_once() -> (std::net::SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
                socket.write_all(&buf[..n]).await.unwrap();
            }
            received
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Grab a free port, then release it so nothing listens there
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TransferClient::connect(&config_for(port)).await;
        assert!(matches!(result, Err(EchoLineError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_transfer_sends_file_and_sentinel() {
        let (addr, server) = spawn_echo_once().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"alpha\nbeta\n").unwrap();

        let mut config = config_for(addr.port());
        config.capture_echo = true;

        let mut client = TransferClient::connect(&config).await.unwrap();
        assert_eq!(client.state(), TransferState::Connecting);
        let report = client.transfer(file.path()).await.unwrap();
        assert_eq!(client.state(), TransferState::Closed);
        assert!(client.peer_addr().is_none());

        assert_eq!(report.lines, 2);
        assert_eq!(report.bytes_sent, 11 + 9);
        assert!(report.sentinel_echoed);
        assert_eq!(report.echo.as_deref(), Some(&b"alpha\nbeta\n--over--\n"[..]));

        let received = server.await.unwrap();
        assert_eq!(received, b"alpha\nbeta\n--over--\n".to_vec());
    }

    #[tokio::test]
    async fn test_transfer_runs_once() {
        let (addr, _server) = spawn_echo_once().await;
        let file = tempfile::NamedTempFile::new().unwrap();

        let mut client = TransferClient::connect(&config_for(addr.port())).await.unwrap();
        client.transfer(file.path()).await.unwrap();

        let again = client.transfer(file.path()).await;
        assert!(matches!(again, Err(EchoLineError::InvalidInput(_))));
        assert_eq!(client.state(), TransferState::Closed);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_client_failed() {
        // Accepts, then hangs up without reading
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        let line = "y".repeat(1023);
        for _ in 0..16 * 1024 {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();

        let mut client = TransferClient::connect(&config_for(addr.port())).await.unwrap();
        server.await.unwrap();

        let result = client.transfer(file.path()).await;
        assert!(matches!(result, Err(EchoLineError::Transfer { .. })));
        assert_eq!(client.state(), TransferState::Failed);
        assert!(client.peer_addr().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_fails_and_closes() {
        let (addr, server) = spawn_echo_once().await;
        let mut client = TransferClient::connect(&config_for(addr.port())).await.unwrap();
        let result = client.transfer("/nonexistent/echoline/input.txt").await;

        assert!(matches!(
            result,
            Err(EchoLineError::Transfer { stage: TransferStage::Reading, .. })
        ));
        assert_eq!(client.state(), TransferState::Failed);
        // The remote sees a clean close and nothing else
        assert!(server.await.unwrap().is_empty());
    }
}
