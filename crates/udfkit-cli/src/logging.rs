//! Structured logging for the udfkit command line
//!
//! Features:
//! - Human-readable or JSON events on the console (stderr, so results on
//!   stdout stay clean)
//! - Daily rotated log files
//! - Per-module levels through `RUST_LOG` style directives

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format (structured logging)
    Json,
    /// Single-line format
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Both,
}

impl LogOutput {
    pub fn parse(value: &str) -> Self {
        match value {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn file_appender(directory: &str) -> RollingFileAppender {
    std::fs::create_dir_all(directory).ok();
    RollingFileAppender::new(Rotation::DAILY, directory, "udfkit.log")
}

/// Initialize the logging system from configuration
///
/// Examples:
/// ```bash
/// # debug events from the registry only
/// RUST_LOG=udfkit_registry=debug udfkit resolve sqrt int32
///
/// # JSON to a daily rotated file
/// LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/udfkit udfkit catalog
/// ```
pub fn init(config: &LoggingConfig) {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);

    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match output {
        LogOutput::Stdout => registry.with(console_layer(format)).try_init(),
        LogOutput::File => registry
            .with(
                fmt::layer()
                    .with_writer(file_appender(&config.directory))
                    .with_ansi(false),
            )
            .try_init(),
        LogOutput::Both => registry
            .with(console_layer(format))
            .with(
                fmt::layer()
                    .with_writer(file_appender(&config.directory))
                    .with_ansi(false)
                    .boxed(),
            )
            .try_init(),
    };
    if result.is_err() {
        // a subscriber was installed earlier, keep it
        return;
    }

    tracing::debug!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Compact);
    }

    #[test]
    fn test_log_output_parse() {
        assert_eq!(LogOutput::parse("file"), LogOutput::File);
        assert_eq!(LogOutput::parse("both"), LogOutput::Both);
        assert_eq!(LogOutput::parse("stdout"), LogOutput::Stdout);
        assert_eq!(LogOutput::parse(""), LogOutput::Stdout);
    }
}
