// TCP module - Echo service and transfer client over tokio sockets
pub mod client;
pub mod server;

pub use client::{transfer, TransferClient};
pub use server::{EchoServer, ServerEvent};
