use crate::core::connection::{ConnectionSummary, EchoConnection, EchoSettings};
use crate::domain::config::ServiceConfig;
use crate::domain::error::{EchoLineError, EchoLineResult};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent failure (e.g. EMFILE) does not
/// spin the accept loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle notifications published by the accept loop and the handlers
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Accepted {
        conn_id: u64,
        peer: SocketAddr,
    },
    Closed {
        conn_id: u64,
        peer: SocketAddr,
        summary: ConnectionSummary,
    },
}

/// Source of incoming connections for the accept loop
pub(crate) trait Acceptor: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// TCP echo service: every accepted connection gets its own task that
/// returns all received bytes verbatim.
pub struct EchoServer {
    listener: Option<TcpListener>,
    bind_addr: SocketAddr,
    settings: EchoSettings,
    event_sender: Option<mpsc::Sender<ServerEvent>>,
    shutdown_sender: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl EchoServer {
    /// Bind and listen on `config.host:config.port` with the configured backlog
    pub async fn bind(config: &ServiceConfig) -> EchoLineResult<Self> {
        config.validate()?;
        let requested = config.bind_addr();
        let bind_error = |source: io::Error| EchoLineError::Bind {
            addr: requested.clone(),
            source,
        };

        let addr = lookup_host((config.host.as_str(), config.port))
            .await
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "host resolved to no addresses",
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;

        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(config.backlog).map_err(bind_error)?;
        let actual_addr = listener.local_addr().map_err(bind_error)?;

        info!("Echo server bound to {} (backlog {})", actual_addr, config.backlog);

        Ok(Self {
            listener: Some(listener),
            bind_addr: actual_addr,
            settings: EchoSettings {
                buffer_size: config.buffer_size,
                read_timeout: config.read_timeout(),
                write_timeout: config.write_timeout(),
            },
            event_sender: None,
            shutdown_sender: None,
            server_handle: None,
        })
    }

    pub fn get_bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Receive lifecycle events. Must be called before [`EchoServer::start`].
    ///
    /// At most `capacity` events are queued; further events are dropped until
    /// the receiver catches up. Without a subscriber no events are produced.
    pub fn subscribe(&mut self, capacity: usize) -> EchoLineResult<mpsc::Receiver<ServerEvent>> {
        if self.is_running() {
            return Err(EchoLineError::Config {
                message: "Cannot subscribe to a running server".to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.event_sender = Some(sender);
        Ok(receiver)
    }

    /// Spawn the accept loop. Returns immediately; the loop keeps running
    /// until [`EchoServer::stop`] or the server is dropped.
    pub fn start(&mut self) -> EchoLineResult<()> {
        let listener = self.listener.take().ok_or_else(|| EchoLineError::Config {
            message: "Server is already running".to_string(),
        })?;

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let settings = self.settings.clone();
        let events = self.event_sender.take();

        info!("Starting echo server on {}", self.bind_addr);
        self.server_handle = Some(tokio::spawn(accept_loop(
            listener,
            settings,
            events,
            shutdown_receiver,
        )));
        self.shutdown_sender = Some(shutdown_sender);

        Ok(())
    }

    /// Run in the foreground until `shutdown` resolves
    pub async fn run_until<F>(mut self, shutdown: F) -> EchoLineResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        shutdown.await;
        info!("Shutdown requested");
        self.stop().await
    }

    pub async fn stop(&mut self) -> EchoLineResult<()> {
        if let Some(handle) = self.server_handle.take() {
            info!("Stopping echo server");

            if let Some(sender) = self.shutdown_sender.take() {
                if sender.send(()).is_err() {
                    warn!("Accept loop already exited before shutdown signal");
                }
            }

            if let Err(e) = handle.await {
                warn!("Server task completed with error: {}", e);
            }

            info!("Echo server stopped");
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.server_handle.is_some()
    }
}

impl Drop for EchoServer {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            debug!("EchoServer dropped while running; aborting accept loop");
            handle.abort();
        }
    }
}

fn publish(events: &Option<mpsc::Sender<ServerEvent>>, event: ServerEvent) {
    if let Some(sender) = events {
        if sender.try_send(event).is_err() {
            debug!("Event queue full or closed; dropping server event");
        }
    }
}

async fn accept_loop<A: Acceptor>(
    listener: A,
    settings: EchoSettings,
    events: Option<mpsc::Sender<ServerEvent>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        next_id += 1;
                        let conn_id = next_id;
                        info!(conn_id, %peer, "Accepted connection");
                        publish(&events, ServerEvent::Accepted { conn_id, peer });

                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            conn_id,
                            settings.clone(),
                            events.clone(),
                        ));
                    }
                    Err(e) => {
                        // Transient: the listener itself is still healthy
                        error!("{}", EchoLineError::Accept(e));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }

            _ = &mut shutdown => {
                info!("Received shutdown signal, stopping accept loop");
                break;
            }
        }
    }
}

async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    conn_id: u64,
    settings: EchoSettings,
    events: Option<mpsc::Sender<ServerEvent>>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut connection = EchoConnection::new(stream, settings);

    if let Err(source) = connection.run().await {
        let err = EchoLineError::ConnectionIo { peer, source };
        warn!(conn_id, "{}", err);
    }

    let summary = connection.summary();
    info!(
        conn_id,
        %peer,
        bytes = summary.bytes_echoed,
        chunks = summary.chunks,
        "Connection closed"
    );
    publish(&events, ServerEvent::Closed { conn_id, peer, summary });
}
