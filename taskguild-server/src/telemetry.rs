use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the tracing subscriber for logging and telemetry.
pub fn init_telemetry(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level)).context("Invalid log level configuration")?;

    let registry = Registry::default().with(env_filter);

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true);
            registry.with(fmt_layer).init();
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_list(true)
                .flatten_event(true);
            registry.with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer =
                fmt::layer().compact().with_target(true).with_thread_ids(false).with_thread_names(false).with_file(false).with_line_number(false);
            registry.with(fmt_layer).init();
        }
    }

    tracing::info!(log_level = %config.level, log_format = ?config.format, "Telemetry initialized");

    Ok(())
}

/// Span for a repository/database operation.
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::info_span!("database_operation", operation = $operation)
    };
    ($operation:expr, $($key:expr => $value:expr),*) => {
        tracing::info_span!("database_operation", operation = $operation, $($key = $value),*)
    };
}

/// Span for an RPC handler operation.
#[macro_export]
macro_rules! rpc_span {
    ($method:expr) => {
        tracing::info_span!("rpc_method", method = $method)
    };
    ($method:expr, $($key:expr => $value:expr),*) => {
        tracing::info_span!("rpc_method", method = $method, $($key = $value),*)
    };
}

/// Span for an agent pool/scaling operation.
#[macro_export]
macro_rules! agent_span {
    ($operation:expr) => {
        tracing::info_span!("agent_operation", operation = $operation)
    };
    ($operation:expr, $($key:expr => $value:expr),*) => {
        tracing::info_span!("agent_operation", operation = $operation, $($key = $value),*)
    };
}

pub fn log_startup_info(config: &crate::config::Config) {
    tracing::info!(
        server_address = %config.server_address(),
        database_url = %config.database_url(),
        max_connections = config.database.max_connections,
        task_definition_path = %config.daemon.task_definition_path,
        agent_classes = config.agents.len(),
        "taskguild daemon starting up"
    );
}

pub fn log_config_validation(config: &crate::config::Config) {
    match config.validate() {
        Ok(()) => tracing::info!("Configuration validation passed"),
        Err(e) => tracing::error!(error = %e, "Configuration validation failed"),
    }
}

#[allow(dead_code)]
pub fn report_error(error: &anyhow::Error, context: &str) {
    tracing::error!(error = %error, context = context, "Operation failed");

    let mut current = error.source();
    let mut depth = 1;
    while let Some(err) = current {
        tracing::error!(error = %err, depth = depth, "Error cause");
        current = err.source();
        depth += 1;
    }
}

/// Measures and logs the wall-clock cost of one operation, warning past a
/// slow-operation threshold.
#[allow(dead_code)]
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    #[allow(dead_code)]
    pub fn new(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        tracing::debug!(operation = %operation, "Starting performance timer");
        Self { start: std::time::Instant::now(), operation }
    }

    #[allow(dead_code)]
    pub fn finish(self) {
        let duration = self.start.elapsed();
        tracing::info!(operation = %self.operation, duration_ms = duration.as_millis(), "Operation completed");

        if duration.as_millis() > 1000 {
            tracing::warn!(operation = %self.operation, duration_ms = duration.as_millis(), "Slow operation detected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn performance_timer_does_not_panic() {
        let timer = PerformanceTimer::new("test_operation");
        std::thread::sleep(Duration::from_millis(5));
        timer.finish();
    }

    #[test]
    fn log_formats_are_distinguishable() {
        let configs = vec![
            LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
            LoggingConfig { level: "debug".to_string(), format: LogFormat::Json },
            LoggingConfig { level: "warn".to_string(), format: LogFormat::Compact },
        ];
        for config in configs {
            assert!(matches!(config.format, LogFormat::Pretty | LogFormat::Json | LogFormat::Compact));
        }
    }
}
