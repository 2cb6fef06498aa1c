// Core module - Protocol logic independent of sockets and files
pub mod connection;
pub mod protocol;
pub mod transfer;
