#![allow(dead_code)]

use dialback_core::{ConnHandle, DialbackConfig};
use dialback_server::runtime::{Runtime, RuntimeHandle, TransportCommand};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One server: its runtime plus the command stream a transport would read.
pub struct Peer {
    pub handle: RuntimeHandle,
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
    pub task: JoinHandle<()>,
}

impl Peer {
    pub fn new(domain: &str, secret: &str) -> Self {
        Self::with_config(domain, secret, DialbackConfig::default())
    }

    pub fn with_config(domain: &str, secret: &str, config: DialbackConfig) -> Self {
        let secrets = HashMap::from([(domain.to_string(), secret.to_string())]);
        let (runtime, handle, commands) = Runtime::new(config, secrets);
        Self {
            handle,
            commands,
            task: runtime.spawn(),
        }
    }

    /// The next transport command, failing the test after a few seconds.
    pub async fn next(&mut self) -> TransportCommand {
        tokio::time::timeout(Duration::from_secs(5), self.commands.recv())
            .await
            .expect("timed out waiting for a transport command")
            .expect("runtime stopped")
    }

    /// Asserts that everything submitted so far produced no further commands.
    ///
    /// Inspecting `conn` is a round trip through the runtime, which flushes
    /// the commands of every earlier event.
    pub async fn assert_idle(&mut self, conn: ConnHandle) {
        self.handle.connection(conn).await.expect("runtime running");
        assert!(
            self.commands.try_recv().is_err(),
            "unexpected transport command"
        );
    }
}
