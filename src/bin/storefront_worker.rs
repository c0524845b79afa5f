//! Storefront Worker Binary
//!
//! Runs the background task processor (verification and order-confirmation
//! mail) until Ctrl+C or SIGTERM, then tears down in order.

use anyhow::Context;
use tracing::info;

use storefront_core::bootstrap::PgStorefrontContext;
use storefront_core::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting storefront worker");

    let context = PgStorefrontContext::bootstrap()
        .await
        .context("failed to bootstrap storefront")?;
    let processor = context
        .default_task_processor()
        .context("failed to build task processor")?;

    processor
        .start()
        .await
        .context("failed to start task processor")?;
    info!(
        workers = processor.config().worker_count,
        queues = ?processor.config().queues,
        "Storefront worker ready"
    );

    shutdown_signal().await;
    info!("Shutdown signal received");

    context.shutdown(Some(processor.as_ref())).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
