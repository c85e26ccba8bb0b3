//! OS signal handling.

/// Resolves on the first Ctrl-C / SIGINT.
///
/// If the handler cannot be installed the failure is logged and the future
/// never resolves, leaving listener failure as the only way out.
pub async fn interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install interrupt handler");
            std::future::pending::<()>().await;
        }
    }
}
