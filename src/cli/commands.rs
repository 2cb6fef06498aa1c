use crate::cli::args::{Args, Command, ConfigCommand, CountArgs, SendArgs, ServeArgs};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::domain::config::{EchoLineConfig, LineEndings};
use crate::domain::error::{EchoLineError, EchoLineResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::tcp::{EchoServer, TransferClient};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Result of the line counting benchmark
#[derive(Debug, Clone, Serialize)]
pub struct LineCount {
    pub file: String,
    pub lines: u64,
    pub bytes: u64,
    pub elapsed_us: u128,
}

/// Execute CLI command. A failure is reported on stderr in the selected
/// output format before it is returned.
pub async fn execute_command(args: Args) -> EchoLineResult<()> {
    let writer = ConsoleWriter::new(args.output);

    let result = run_command(args, &writer).await;
    if let Err(e) = &result {
        if let Err(output_err) = writer.write_error(&e.to_string()) {
            eprintln!("Error: {} ({})", e, output_err);
        }
    }
    result
}

async fn run_command(args: Args, writer: &ConsoleWriter) -> EchoLineResult<()> {
    let config_manager = ConfigManager::new();
    let config = match &args.config {
        Some(config_path) => config_manager.load_config_from_path(config_path)?,
        None => config_manager.load_config()?,
    };

    if !args.quiet {
        init_logging(&config.log_level, args.verbose)?;
    }

    match args.command {
        Command::Serve(serve_args) => execute_serve(serve_args, config).await,
        Command::Send(send_args) => execute_send(send_args, writer, config).await,
        Command::Count(count_args) => execute_count(count_args, writer).await,
        Command::Config(config_args) => {
            execute_config_command(config_args.command, writer, &config, &config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("echoline {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

async fn execute_serve(args: ServeArgs, mut config: EchoLineConfig) -> EchoLineResult<()> {
    let service = &mut config.service;
    if let Some(host) = args.host {
        service.host = host;
    }
    if let Some(port) = args.port {
        service.port = port;
    }
    if let Some(backlog) = args.backlog {
        service.backlog = backlog;
    }
    if let Some(buffer_size) = args.buffer_size {
        service.buffer_size = buffer_size;
    }
    if args.read_timeout_ms.is_some() {
        service.read_timeout_ms = args.read_timeout_ms;
    }

    let server = EchoServer::bind(service).await?;
    info!("Listening on {} (Ctrl+C to stop)", server.get_bind_addr());

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

async fn execute_send(
    args: SendArgs,
    writer: &ConsoleWriter,
    mut config: EchoLineConfig,
) -> EchoLineResult<()> {
    let client = &mut config.client;
    if let Some(host) = args.host {
        client.host = host;
    }
    if let Some(port) = args.port {
        client.port = port;
    }
    if args.connect_timeout_ms.is_some() {
        client.connect_timeout_ms = args.connect_timeout_ms;
    }
    if args.normalize {
        client.line_endings = LineEndings::Normalize;
    }
    if args.capture {
        client.capture_echo = true;
    }

    let started = Instant::now();
    let mut transfer_client = TransferClient::connect(client).await?;
    let mut report = transfer_client.transfer(&args.file).await?;
    // Include connection setup, as the original timing harness did
    report.elapsed_us = started.elapsed().as_micros();

    writer.write_report(&report)?;
    if let Some(echo) = &report.echo {
        writer.write_message(&String::from_utf8_lossy(echo))?;
    }
    Ok(())
}

async fn execute_count(args: CountArgs, writer: &ConsoleWriter) -> EchoLineResult<()> {
    let count = count_lines(&args.file).await?;
    writer.write_line_count(&count)?;
    Ok(())
}

/// Count lines the way the transfer client splits them. The counter is a
/// local of this benchmark, not part of the transfer path.
pub async fn count_lines(path: &Path) -> EchoLineResult<LineCount> {
    let started = Instant::now();
    let file = File::open(path).await.map_err(|e| {
        EchoLineError::InvalidInput(format!("Cannot open {}: {}", path.display(), e))
    })?;
    let mut reader = BufReader::new(file);

    let mut lines = 0u64;
    let mut bytes = 0u64;
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }
        lines += 1;
        bytes += n as u64;
    }

    Ok(LineCount {
        file: path.display().to_string(),
        lines,
        bytes,
        elapsed_us: started.elapsed().as_micros(),
    })
}

fn execute_config_command(
    command: ConfigCommand,
    writer: &ConsoleWriter,
    config: &EchoLineConfig,
    config_manager: &ConfigManager,
) -> EchoLineResult<()> {
    match command {
        ConfigCommand::Show => writer.write_config(config)?,
        ConfigCommand::Init { dir } => {
            let path = config_manager.init_project_config(&dir)?;
            writer.write_message(&format!("Created {}", path.display()))?;
        }
        ConfigCommand::Path => {
            let describe = |path: Option<&std::path::PathBuf>| {
                path.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            };
            writer.write_message(&format!(
                "global: {}",
                describe(config_manager.get_global_config_path_ref())
            ))?;
            writer.write_message(&format!(
                "project: {}",
                describe(config_manager.get_project_config_path())
            ))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_count_lines_counts_unterminated_tail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"one\ntwo\r\nthree").unwrap();

        let count = count_lines(file.path()).await.unwrap();
        assert_eq!(count.lines, 3);
        assert_eq!(count.bytes, 14);
    }

    #[tokio::test]
    async fn test_count_lines_missing_file() {
        let err = count_lines(Path::new("/nonexistent/echoline.txt")).await.unwrap_err();
        assert!(matches!(err, EchoLineError::InvalidInput(_)));
    }
}
