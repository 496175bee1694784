//! Plugin process launching.
//!
//! The wire protocol spoken with a plugin process belongs to the host. This
//! module only defines the seams: a [`PluginConnector`] turns an invocation
//! recipe into a connected [`PluginClient`], and [`ProcessConnector`] does so
//! by spawning a child with piped stdio and handing the pipes to a
//! host-supplied [`Handshake`].

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::capability::CapabilityProvider;
use crate::error::{HostError, Result};

/// Connection to a running plugin process.
#[async_trait]
pub trait PluginClient: Send + Sync {
    /// Request a capability provider from the plugin.
    async fn provider(&self) -> Result<Box<dyn CapabilityProvider>>;
}

/// Launches a plugin and negotiates the initial handshake.
#[async_trait]
pub trait PluginConnector: Send + Sync {
    async fn connect(&self, path: &Path, args: &[String]) -> Result<Arc<dyn PluginClient>>;
}

/// Protocol negotiation over a freshly spawned child's stdio.
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn handshake(
        &self,
        stdin: ChildStdin,
        stdout: ChildStdout,
    ) -> Result<Arc<dyn PluginClient>>;
}

/// Connector that spawns plugin executables as child processes.
///
/// Spawned children are tracked so the host can terminate them on exit
/// with [`ProcessConnector::cleanup_clients`].
pub struct ProcessConnector<H> {
    handshake: H,
    children: Mutex<Vec<Child>>,
}

impl<H: Handshake> ProcessConnector<H> {
    /// Create a connector using the given handshake.
    pub fn new(handshake: H) -> Self {
        Self {
            handshake,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Number of children spawned and not yet cleaned up.
    pub async fn child_count(&self) -> usize {
        self.children.lock().await.len()
    }

    /// Kill and reap every spawned plugin process.
    pub async fn cleanup_clients(&self) {
        let mut children = self.children.lock().await;
        for mut child in children.drain(..) {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill plugin process {:?}: {}", child.id(), e);
            }
        }
    }
}

#[async_trait]
impl<H: Handshake> PluginConnector for ProcessConnector<H> {
    async fn connect(&self, path: &Path, args: &[String]) -> Result<Arc<dyn PluginClient>> {
        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| HostError::Launch {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Spawned plugin {:?} (pid {:?})", path, child.id());

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        // Track before the handshake so a failed negotiation still gets cleaned up
        self.children.lock().await.push(child);

        let (stdin, stdout) = match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(HostError::Launch {
                    path: path.to_path_buf(),
                    reason: "child stdio was not captured".to_string(),
                })
            }
        };

        self.handshake.handshake(stdin, stdout).await
    }
}
