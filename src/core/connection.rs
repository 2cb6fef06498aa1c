use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Run `fut` under an optional deadline. `None` waits indefinitely.
pub async fn with_timeout<F, T>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no progress within {:?}", limit),
                )
            })?,
        None => fut.await,
    }
}

/// Per-connection lifecycle on the service side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Accepted,
    Echoing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Accepted => write!(f, "Accepted"),
            ConnectionState::Echoing => write!(f, "Echoing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Why a connection left the echo loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    /// Zero-byte read
    PeerClosed,
    ReadFailed(String),
    WriteFailed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::ReadFailed(e) => write!(f, "read failed: {}", e),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {}", e),
        }
    }
}

/// Knobs for a single echo loop
#[derive(Debug, Clone)]
pub struct EchoSettings {
    pub buffer_size: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Totals for a finished connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub bytes_echoed: u64,
    pub chunks: u64,
    pub reason: Option<CloseReason>,
}

/// Echoes everything read from `stream` back to it until the peer closes.
///
/// The connection owns its stream and buffer; nothing is shared with other
/// connections.
pub struct EchoConnection<S> {
    stream: S,
    buffer: Vec<u8>,
    settings: EchoSettings,
    state: ConnectionState,
    bytes_echoed: u64,
    chunks: u64,
    reason: Option<CloseReason>,
}

impl<S> EchoConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, settings: EchoSettings) -> Self {
        Self {
            stream,
            buffer: vec![0u8; settings.buffer_size.max(1)],
            settings,
            state: ConnectionState::Accepted,
            bytes_echoed: 0,
            chunks: 0,
            reason: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drive the loop to completion. A read or write failure is returned after
    /// the connection has already moved to `Closed`.
    pub async fn run(&mut self) -> io::Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection already closed"));
        }
        self.state = ConnectionState::Echoing;

        let result = self.echo_loop().await;
        self.reason = Some(match &result {
            Ok(()) => CloseReason::PeerClosed,
            Err((reason, _)) => reason.clone(),
        });

        // Best effort; the peer may already be gone
        if let Err(e) = self.stream.shutdown().await {
            trace!("Shutdown after echo loop failed: {}", e);
        }
        self.state = ConnectionState::Closed;

        result.map_err(|(_, e)| e)
    }

    async fn echo_loop(&mut self) -> Result<(), (CloseReason, io::Error)> {
        loop {
            let n = with_timeout(self.settings.read_timeout, self.stream.read(&mut self.buffer))
                .await
                .map_err(|e| (CloseReason::ReadFailed(e.to_string()), e))?;

            if n == 0 {
                debug!(bytes = self.bytes_echoed, "Peer closed connection");
                return Ok(());
            }

            let chunk = &self.buffer[..n];
            with_timeout(self.settings.write_timeout, self.stream.write_all(chunk))
                .await
                .map_err(|e| (CloseReason::WriteFailed(e.to_string()), e))?;

            self.bytes_echoed += n as u64;
            self.chunks += 1;
            trace!(bytes = n, "Echoed chunk");
        }
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            bytes_echoed: self.bytes_echoed,
            chunks: self.chunks,
            reason: self.reason.clone(),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_echo_until_peer_closes() {
        let (mut client, server) = duplex(64);
        let mut conn = EchoConnection::new(server, EchoSettings::default());
        assert_eq!(conn.state(), ConnectionState::Accepted);

        let handle = tokio::spawn(async move {
            let result = conn.run().await;
            (result.is_ok(), conn.state(), conn.summary())
        });

        client.write_all(b"abc").await.unwrap();
        let mut echoed = [0u8; 3];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"abc");

        client.shutdown().await.unwrap();
        let (ok, state, summary) = handle.await.unwrap();
        assert!(ok);
        assert_eq!(state, ConnectionState::Closed);
        assert_eq!(summary.bytes_echoed, 3);
        assert_eq!(summary.reason, Some(CloseReason::PeerClosed));
    }

    #[tokio::test]
    async fn test_small_buffer_still_echoes_everything() {
        let (mut client, server) = duplex(1024);
        let settings = EchoSettings {
            buffer_size: 4,
            ..EchoSettings::default()
        };
        let mut conn = EchoConnection::new(server, settings);
        let handle = tokio::spawn(async move {
            conn.run().await.unwrap();
            conn.summary()
        });

        let payload = b"0123456789abcdef-over-";
        client.write_all(payload).await.unwrap();
        client.shutdown().await.unwrap();

        let mut echoed = Vec::new();
        client.read_to_end(&mut echoed).await.unwrap();
        assert_eq!(echoed, payload);

        let summary = handle.await.unwrap();
        assert_eq!(summary.bytes_echoed, payload.len() as u64);
        assert!(summary.chunks >= (payload.len() / 4) as u64);
    }

    #[tokio::test]
    async fn test_read_error_closes_connection() {
        let stream = tokio_test::io::Builder::new()
            .read(b"ping")
            .write(b"ping")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let mut conn = EchoConnection::new(stream, EchoSettings::default());
        let err = conn.run().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(conn.state(), ConnectionState::Closed);

        let summary = conn.summary();
        assert_eq!(summary.bytes_echoed, 4);
        assert!(matches!(summary.reason, Some(CloseReason::ReadFailed(_))));

        // A closed connection is never driven again
        assert!(conn.run().await.is_err());
    }

    #[tokio::test]
    async fn test_read_timeout_closes_idle_connection() {
        let (_client, server) = duplex(64);
        let settings = EchoSettings {
            read_timeout: Some(Duration::from_millis(20)),
            ..EchoSettings::default()
        };

        let mut conn = EchoConnection::new(server, settings);
        let err = conn.run().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_echo_returns_identical_bytes(
            payload in proptest::collection::vec(any::<u8>(), 0..16384)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let echoed = rt.block_on(async {
                let (mut client, server) = duplex(4096);
                let mut conn = EchoConnection::new(server, EchoSettings::default());
                let server_task = tokio::spawn(async move { conn.run().await });

                let (mut rd, mut wr) = tokio::io::split(&mut client);
                let writer = async {
                    wr.write_all(&payload).await.unwrap();
                    wr.shutdown().await.unwrap();
                };
                let reader = async {
                    let mut out = Vec::new();
                    rd.read_to_end(&mut out).await.unwrap();
                    out
                };
                let ((), out) = tokio::join!(writer, reader);
                server_task.await.unwrap().unwrap();
                out
            });
            prop_assert_eq!(echoed, payload);
        }
    }
}
