use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Phase of a transfer in which an I/O failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Opening or reading the source file
    Reading,
    /// Writing a line or the sentinel to the socket
    Writing,
    /// Flushing, shutting down, or draining the echo
    Finalizing,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStage::Reading => write!(f, "reading"),
            TransferStage::Writing => write!(f, "writing"),
            TransferStage::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// echoline unified error type
#[derive(Error, Debug)]
pub enum EchoLineError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("Connection I/O error with {peer}: {source}")]
    ConnectionIo {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer failed while {stage}: {source}")]
    Transfer {
        stage: TransferStage,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EchoLineError {
    pub(crate) fn transfer(stage: TransferStage, source: std::io::Error) -> Self {
        Self::Transfer { stage, source }
    }

    /// Errors that only affect a single connection or client invocation
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            EchoLineError::Accept(_)
                | EchoLineError::ConnectionIo { .. }
                | EchoLineError::Transfer { .. }
        )
    }
}

pub type EchoLineResult<T> = Result<T, EchoLineError>;
