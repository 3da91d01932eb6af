//! Dialback host process.
//!
//! Wires configuration, authentication providers and the dialback runtime
//! together. The XML stream transport is not part of this crate: it feeds
//! [`runtime::RuntimeHandle`] and executes the
//! [`runtime::TransportCommand`]s it receives.

pub mod auth;
pub mod config;
pub mod runtime;

use auth::{AnonymousProvider, AuthError, ProviderRegistry};
use config::{Config, ConfigError, LoggingConfig};
use runtime::{Runtime, RuntimeHandle, TransportCommand};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}

/// Installs the global tracing subscriber described by `[logging]`.
///
/// An unparseable filter falls back to `info`.
///
/// # Errors
///
/// Returns `StartupError::Logging` if a global subscriber is already set.
pub fn init_logging(logging: &LoggingConfig) -> Result<(), StartupError> {
    let (filter, invalid) = match EnvFilter::try_new(&logging.level) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new("info"), Some(e)),
    };
    let installed = if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    installed.map_err(|e| StartupError::Logging(e.to_string()))?;

    if let Some(e) = invalid {
        tracing::warn!(level = %logging.level, error = %e, "invalid log filter, using info");
    }
    Ok(())
}

/// A started server.
pub struct Server {
    /// Feeds stream events to the dialback runtime.
    pub runtime: RuntimeHandle,
    /// Effects the transport must perform.
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
    /// Client authentication providers.
    pub providers: ProviderRegistry,
    /// The runtime task. Finishes once every [`RuntimeHandle`] is dropped.
    pub task: JoinHandle<()>,
}

/// Resolves hosted domains, registers providers and spawns the runtime.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns `StartupError` if a hosted domain is invalid or a provider
/// cannot be registered.
pub fn start(config: &Config) -> Result<Server, StartupError> {
    let secrets = config.host_secrets()?;
    if secrets.is_empty() {
        tracing::warn!("no hosted domains configured; every dialback assertion will be refused");
    }

    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(AnonymousProvider::new(
        config.auth.allow_anonymous,
    )))?;

    let (runtime, handle, commands) = Runtime::new(config.dialback.clone(), secrets);
    let task = runtime.spawn();

    Ok(Server {
        runtime: handle,
        commands,
        providers,
        task,
    })
}

impl Server {
    /// Logs transport commands until `shutdown` resolves, then stops the
    /// runtime and waits for it.
    ///
    /// Used when no stream transport is attached to the process.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) {
        let Server {
            runtime,
            mut commands,
            providers,
            task,
        } = self;
        tracing::info!(
            providers = ?providers.names().collect::<Vec<_>>(),
            "dialback server running"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                command = commands.recv() => match command {
                    Some(command) => log_command(&command),
                    None => break,
                },
            }
        }

        drop(runtime);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "dialback runtime task failed");
        }
        while let Ok(command) = commands.try_recv() {
            log_command(&command);
        }
        tracing::info!("dialback server shut down");
    }
}

fn log_command(command: &TransportCommand) {
    match command {
        TransportCommand::Close { conn, close } => {
            tracing::info!(conn = %conn, %close, "transport close requested");
        }
        TransportCommand::Bounce { conn, reason, stanzas } => {
            tracing::info!(conn = %conn, reason = %reason, count = stanzas.len(), "bouncing queued stanzas");
        }
        other => tracing::debug!(command = ?other, "transport command"),
    }
}
