//! echoline Library
//!
//! A line-oriented TCP echo service and a client that streams a file to it
//! line by line, ending the transfer with a sentinel record.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::connection::{
    CloseReason, ConnectionState, ConnectionSummary, EchoConnection, EchoSettings,
};
pub use crate::core::protocol::SENTINEL;
pub use crate::core::transfer::{TransferReport, TransferState};
pub use crate::domain::config::{ClientConfig, EchoLineConfig, LineEndings, ServiceConfig};
pub use crate::domain::error::{EchoLineError, EchoLineResult, TransferStage};
pub use crate::infrastructure::tcp::{transfer, EchoServer, ServerEvent, TransferClient};
