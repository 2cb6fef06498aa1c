// Infrastructure module - Sockets, files, logging and config on disk
pub mod config;
pub mod logging;
pub mod tcp;
