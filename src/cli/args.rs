use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for echoline
#[derive(Parser, Debug)]
#[command(
    name = "echoline",
    version = env!("CARGO_PKG_VERSION"),
    about = "Line-oriented TCP echo service and file transfer client",
    long_about = "A line-oriented TCP echo service paired with a client that streams a file \
                  to it line by line and marks the end with a sentinel record."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress log output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the echo service until interrupted
    Serve(ServeArgs),
    /// Stream a file to an echo service
    Send(SendArgs),
    /// Count the lines of a file
    Count(CountArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Echo service arguments
#[derive(ClapArgs, Debug)]
pub struct ServeArgs {
    /// Bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Port number
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Read buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Close connections idle for this long (milliseconds)
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,
}

/// Transfer client arguments
#[derive(ClapArgs, Debug)]
pub struct SendArgs {
    /// File to stream
    pub file: PathBuf,

    /// Remote host
    #[arg(long)]
    pub host: Option<String>,

    /// Remote port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Connection timeout in milliseconds
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Strip CR/LF and terminate every line with LF
    #[arg(long)]
    pub normalize: bool,

    /// Keep the echoed bytes and print them after the report
    #[arg(long)]
    pub capture: bool,
}

/// Line counter arguments
#[derive(ClapArgs, Debug)]
pub struct CountArgs {
    /// File to count
    pub file: PathBuf,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Create a project configuration
    Init {
        /// Directory to create `.echoline/config.toml` in
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Show configuration file locations
    Path,
}
