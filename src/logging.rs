//! Process-wide tracing setup, shared by both binaries.
//!
//! Defaults to human-readable lines on stdout, matching how a pod's logs are
//! actually consumed (`kubectl logs`, log collectors tailing stdout). A file
//! sink is opt-in via `LoggingConfig::file`, in which case the `{role}`
//! placeholder is substituted with the binary's name ("agent" or
//! "actuator") so both processes can log side by side without colliding.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync + 'static>;

/// Initializes the global tracing subscriber. The returned `WorkerGuard`
/// must be held for the process's lifetime when a file sink is configured
/// (dropping it flushes the non-blocking writer); it is `None` for stdout.
pub fn init_logging(config: &LoggingConfig, role: &str) -> Result<Option<WorkerGuard>> {
    if !config.enabled {
        return Ok(None);
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (layer, guard, where_) = match &config.file {
        None => {
            let layer: BoxedLayer = if config.json {
                Box::new(fmt::layer().with_target(false).json())
            } else {
                Box::new(fmt::layer().with_target(false))
            };
            (layer, None, "stdout".to_string())
        }
        Some(file) => {
            let resolved = file.replace("{role}", role);
            let path = PathBuf::from(&resolved);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let filename = path
                .file_name()
                .context("invalid log filename")?
                .to_str()
                .context("invalid UTF-8 in log filename")?;

            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory: {}", dir.display()))?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(filename)
                .build(dir)
                .context("failed to create log file appender")?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let layer: BoxedLayer = if config.json {
                Box::new(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(false).json())
            } else {
                Box::new(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(false))
            };
            (layer, Some(guard), resolved)
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    tracing::info!(role, sink = %where_, "logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logging_returns_none_without_initializing() {
        let config = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        let guard = init_logging(&config, "test").unwrap();
        assert!(guard.is_none());
    }
}
