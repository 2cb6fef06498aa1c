use crate::domain::error::{EchoLineError, EchoLineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Levels accepted by `log_level`
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// echoline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoLineConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Echo service settings
    #[serde(default)]
    pub service: ServiceConfig,
    /// Transfer client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// Echo service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog handed to the OS
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Size of the per-connection read buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Per-read timeout; blocks indefinitely when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    /// Per-write timeout; blocks indefinitely when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
}

/// Transfer client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
    /// How long to wait for the echo to finish after the write side is shut down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_timeout_ms: Option<u64>,
    #[serde(default)]
    pub line_endings: LineEndings,
    /// Keep echoed bytes in the transfer report
    #[serde(default)]
    pub capture_echo: bool,
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

/// Treatment of line terminators while streaming a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEndings {
    /// Send every line byte-for-byte, terminator included
    #[default]
    Preserve,
    /// Strip `\n` or `\r\n` and terminate every line with `\n`
    Normalize,
}

impl fmt::Display for LineEndings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineEndings::Preserve => write!(f, "preserve"),
            LineEndings::Normalize => write!(f, "normalize"),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5555
}

fn default_backlog() -> u32 {
    1024
}

fn default_buffer_size() -> usize {
    8192
}

fn default_nodelay() -> bool {
    true
}

fn millis(value: Option<u64>) -> Option<Duration> {
    value.map(Duration::from_millis)
}

impl Default for EchoLineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            service: ServiceConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            buffer_size: default_buffer_size(),
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: None,
            write_timeout_ms: None,
            echo_timeout_ms: None,
            line_endings: LineEndings::default(),
            capture_echo: false,
            nodelay: default_nodelay(),
        }
    }
}

impl EchoLineConfig {
    /// Reject values the service or client cannot run with
    pub fn validate(&self) -> EchoLineResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(EchoLineError::Config {
                message: format!("Unknown log level '{}'", self.log_level),
            });
        }
        self.service.validate()?;
        self.client.validate()
    }
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> EchoLineResult<()> {
        if self.buffer_size == 0 {
            return Err(EchoLineError::Config {
                message: "service.buffer_size must be greater than zero".to_string(),
            });
        }
        if self.backlog == 0 {
            return Err(EchoLineError::Config {
                message: "service.backlog must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl ClientConfig {
    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    pub fn echo_timeout(&self) -> Option<Duration> {
        millis(self.echo_timeout_ms)
    }

    pub fn validate(&self) -> EchoLineResult<()> {
        if self.port == 0 {
            return Err(EchoLineError::Config {
                message: "client.port must be a concrete port, not 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = EchoLineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: EchoLineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_defaults_match_reference_setup() {
        let config = EchoLineConfig::default();

        assert_eq!(config.service.bind_addr(), "localhost:5555");
        assert_eq!(config.client.remote_addr(), "localhost:5555");
        assert_eq!(config.service.buffer_size, 8192);
        assert!(config.service.read_timeout().is_none());
        assert!(config.client.connect_timeout().is_none());
        assert_eq!(config.client.line_endings, LineEndings::Preserve);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let content = r#"
            log_level = "debug"

            [service]
            port = 7000
            read_timeout_ms = 250

            [client]
            line_endings = "normalize"
        "#;

        let config: EchoLineConfig = toml::from_str(content).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service.port, 7000);
        assert_eq!(config.service.host, "localhost");
        assert_eq!(config.service.read_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.client.port, 5555);
        assert_eq!(config.client.line_endings, LineEndings::Normalize);
        assert!(config.client.nodelay);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EchoLineConfig::default();
        assert!(config.validate().is_ok());

        config.service.buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = EchoLineConfig::default();
        config.client.port = 0;
        assert!(config.validate().is_err());

        let mut config = EchoLineConfig::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
