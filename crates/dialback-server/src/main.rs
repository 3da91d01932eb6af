//! Dialback server binary.
//!
//! Loads configuration, starts structured logging and the dialback runtime,
//! and shuts down gracefully on SIGTERM/SIGINT.

use dialback_server::config;

#[tokio::main]
async fn main() {
    let (path, source) =
        config::config_path(std::env::args().nth(1), |key| std::env::var(key).ok());
    let config = config::load_config(Some(&path))
        .expect("failed to load configuration; the server cannot start without valid config");
    dialback_server::init_logging(&config.logging).expect("failed to initialise logging");
    tracing::info!(source = source.as_str(), path = %path, "configuration loaded");

    let server = dialback_server::start(&config).expect("failed to start dialback server");
    server.serve(shutdown_requested()).await;
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_requested() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM is not observable; waiting for SIGINT only");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => match interrupted {
            Ok(()) => tracing::info!(signal = "SIGINT", "shutting down"),
            Err(e) => tracing::error!(error = %e, "cannot listen for SIGINT; shutting down"),
        },
        () = terminate => tracing::info!(signal = "SIGTERM", "shutting down"),
    }
}
