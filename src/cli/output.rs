use crate::cli::args::OutputFormat;
use crate::cli::commands::LineCount;
use crate::core::transfer::TransferReport;
use crate::domain::config::EchoLineConfig;
use serde_json;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_report(&self, report: &TransferReport) -> Result<(), OutputError>;
    fn write_line_count(&self, count: &LineCount) -> Result<(), OutputError>;
    fn write_config(&self, config: &EchoLineConfig) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::EchoLineError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_report(&self, report: &TransferReport) -> Result<(), OutputError> {
        println!("{}", render_report(self.format, report)?);
        Ok(())
    }

    fn write_line_count(&self, count: &LineCount) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => {
                println!("{} lines", count.lines);
                println!("{}", count.elapsed_us);
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(count)?),
            OutputFormat::Table => println!("{}", Table::new([LineCountRow::from(count)])),
        }
        Ok(())
    }

    fn write_config(&self, config: &EchoLineConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Text => print!("{}", toml::to_string_pretty(config)?),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            OutputFormat::Table => println!("{}", Table::new(config_rows(config))),
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "message": message });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => println!("{}", message),
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "error": error });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => eprintln!("Error: {}", error),
        }
        Ok(())
    }
}

/// Render a transfer report in `format`
pub fn render_report(format: OutputFormat, report: &TransferReport) -> Result<String, OutputError> {
    let rendered = match format {
        OutputFormat::Text => {
            let mut text = format!(
                "Sent {} lines ({} bytes) from {} to {}\n",
                report.lines, report.bytes_sent, report.file, report.remote
            );
            text.push_str(&format!(
                "Echoed {} bytes, sentinel {}\n",
                report.echoed_bytes,
                if report.sentinel_echoed { "received" } else { "missing" }
            ));
            if report.sentinel_collisions > 0 {
                text.push_str(&format!(
                    "Warning: {} line(s) matched the sentinel record\n",
                    report.sentinel_collisions
                ));
            }
            // Elapsed microseconds on the last line, like the original harness
            text.push_str(&report.elapsed_us.to_string());
            text
        }
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Table => Table::new([TransferTableRow::from(report)]).to_string(),
    };
    Ok(rendered)
}

/// Table row for a transfer report
#[derive(Tabled)]
struct TransferTableRow {
    file: String,
    remote: String,
    lines: u64,
    bytes_sent: u64,
    echoed: u64,
    sentinel: String,
    collisions: u64,
    elapsed_us: u128,
}

impl From<&TransferReport> for TransferTableRow {
    fn from(report: &TransferReport) -> Self {
        Self {
            file: report.file.clone(),
            remote: report.remote.clone(),
            lines: report.lines,
            bytes_sent: report.bytes_sent,
            echoed: report.echoed_bytes,
            sentinel: if report.sentinel_echoed { "yes" } else { "no" }.to_string(),
            collisions: report.sentinel_collisions,
            elapsed_us: report.elapsed_us,
        }
    }
}

/// Table row for the line counter
#[derive(Tabled)]
struct LineCountRow {
    file: String,
    lines: u64,
    bytes: u64,
    elapsed_us: u128,
}

impl From<&LineCount> for LineCountRow {
    fn from(count: &LineCount) -> Self {
        Self {
            file: count.file.clone(),
            lines: count.lines,
            bytes: count.bytes,
            elapsed_us: count.elapsed_us,
        }
    }
}

/// Key/value row for configuration output
#[derive(Tabled)]
struct ConfigRow {
    key: &'static str,
    value: String,
}

fn optional_ms(value: Option<u64>) -> String {
    value.map(|ms| format!("{} ms", ms)).unwrap_or_else(|| "none".to_string())
}

fn config_rows(config: &EchoLineConfig) -> Vec<ConfigRow> {
    let service = &config.service;
    let client = &config.client;
    vec![
        ConfigRow {
            key: "log_level",
            value: config.log_level.clone(),
        },
        ConfigRow {
            key: "service.bind",
            value: service.bind_addr(),
        },
        ConfigRow {
            key: "service.backlog",
            value: service.backlog.to_string(),
        },
        ConfigRow {
            key: "service.buffer_size",
            value: service.buffer_size.to_string(),
        },
        ConfigRow {
            key: "service.read_timeout",
            value: optional_ms(service.read_timeout_ms),
        },
        ConfigRow {
            key: "service.write_timeout",
            value: optional_ms(service.write_timeout_ms),
        },
        ConfigRow {
            key: "client.remote",
            value: client.remote_addr(),
        },
        ConfigRow {
            key: "client.connect_timeout",
            value: optional_ms(client.connect_timeout_ms),
        },
        ConfigRow {
            key: "client.write_timeout",
            value: optional_ms(client.write_timeout_ms),
        },
        ConfigRow {
            key: "client.echo_timeout",
            value: optional_ms(client.echo_timeout_ms),
        },
        ConfigRow {
            key: "client.line_endings",
            value: client.line_endings.to_string(),
        },
        ConfigRow {
            key: "client.capture_echo",
            value: client.capture_echo.to_string(),
        },
        ConfigRow {
            key: "client.nodelay",
            value: client.nodelay.to_string(),
        },
    ]
}
