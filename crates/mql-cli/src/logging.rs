//! Structured logging for `mqlc`
//!
//! Console logs go to stderr so the compiled pipeline on stdout stays
//! machine-readable. Files roll daily as `mqlc.log.<date>`.

use std::str::FromStr;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for collection by log shippers
    Json,
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to compact
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
    Both,
}

impl FromStr for LogOutput {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to stderr
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stderr,
        })
    }
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
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
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    }
}

fn file_layer<S>(config: &LoggingConfig, format: LogFormat) -> anyhow::Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.directory)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, "mqlc.log");
    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(appender)
            .with_current_span(true)
            .boxed(),
        _ => fmt::layer().with_writer(appender).with_ansi(false).boxed(),
    };
    Ok(layer)
}

/// Level filter from `RUST_LOG`-style directives, `warn` when they do not parse
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs the global subscriber
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let format = LogFormat::from_str(&config.format).unwrap_or(LogFormat::Compact);
    let output = LogOutput::from_str(&config.output).unwrap_or(LogOutput::Stderr);
    let filter = env_filter(&config.level);

    match output {
        LogOutput::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(console_layer(format))
            .try_init()?,
        LogOutput::File => tracing_subscriber::registry()
            .with(filter)
            .with(file_layer(config, format)?)
            .try_init()?,
        LogOutput::Both => tracing_subscriber::registry()
            .with(filter)
            .with(console_layer(format))
            .with(file_layer(config, format)?)
            .try_init()?,
    }

    tracing::debug!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "Logging initialized"
    );
    if output != LogOutput::Stderr {
        tracing::debug!(directory = %config.directory, "Writing log files");
    }
    Ok(())
}
