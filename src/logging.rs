//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//! Designed for containerized deployments where logs go to stdout.
//!
//! - Log level from `LOG_LEVEL`, then `RUST_LOG`, then an environment default
//! - TTY-aware ANSI output
//! - JSON lines when `STOREFRONT_LOG_FORMAT=json`
//! - Structured helpers for order and task operations

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json_output = std::env::var("STOREFRONT_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout()) && !json_output;

        let result = if json_output {
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(EnvFilter::new(&log_level));
            tracing_subscriber::registry().with(layer).try_init()
        } else {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level));
            tracing_subscriber::registry().with(layer).try_init()
        };

        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi,
                json = json_output,
                "Console logging initialized"
            );
        }
    });
}

fn get_environment() -> String {
    std::env::var("STOREFRONT_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment variables or environment defaults
fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        return level.to_lowercase();
    }

    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }

    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for order operations
pub fn log_order_operation(
    operation: &str,
    order_id: Option<i64>,
    user_id: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        order_id = order_id,
        user_id = user_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🛒 ORDER_OPERATION"
    );
}

/// Log structured data for queued task operations
pub fn log_task_operation(
    operation: &str,
    task_type: &str,
    queue: &str,
    message_id: Option<&str>,
    state: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_type = %task_type,
        queue = %queue,
        message_id = message_id,
        state = %state,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}
