// Logging module - Logging infrastructure
use crate::domain::error::{EchoLineError, EchoLineResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when `RUST_LOG` is not set
pub fn default_directive(log_level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { log_level };
    format!("echoline={},warn", level)
}

/// Initialize logging system. `RUST_LOG` takes precedence over the configured
/// level; output goes to stderr so reports on stdout stay machine-readable.
pub fn init_logging(log_level: &str, verbose: bool) -> EchoLineResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level, verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true)
                .with_thread_ids(verbose)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| EchoLineError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })?;

    tracing::debug!("echoline logging system initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("warn", false), "echoline=warn,warn");
        assert_eq!(default_directive("warn", true), "echoline=debug,warn");
    }

    #[test]
    fn test_logging_init_only_once() {
        // The first call may lose the race to another test; a second call
        // must always report the subscriber as already set.
        let _ = init_logging("info", false);
        assert!(init_logging("info", false).is_err());
    }
}
