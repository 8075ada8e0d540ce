use chrono::Local;
use std::fmt::Display;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Level filter for the `tfprovision` target when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "TFPROVISION_LOG_LEVEL";

#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

fn filter_level(raw: &str) -> &'static str {
    match raw.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over `TFPROVISION_LOG_LEVEL`.
pub fn init() {
    let level = filter_level(&std::env::var(LOG_LEVEL_ENV).unwrap_or_default());
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tfprovision={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Progress line on stderr with timestamp and level, for the operator.
pub fn log(level: LogLevel, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    eprintln!("[{}] [{}] {}", timestamp, level, message);
}

pub fn info(message: &str) {
    log(LogLevel::Info, message);
}

pub fn warn(message: &str) {
    log(LogLevel::Warning, message);
}

pub fn error(message: &str) {
    log(LogLevel::Error, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_level() {
        assert_eq!(filter_level("DEBUG"), "debug");
        assert_eq!(filter_level("warning"), "warn");
        assert_eq!(filter_level(""), "info");
        assert_eq!(filter_level("verbose"), "info");
    }
}
