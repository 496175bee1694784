//! Plugin manager: owns the handle set and drives discovery, loading and
//! the used-plugin cache.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::batch::run_bounded;
use crate::builtin::BuiltinRegistry;
use crate::capability::CoreConfig;
use crate::config::PluginConfig;
use crate::discovery::{discover, ExternalPlugin};
use crate::error::{HostError, Result};
use crate::handle::PluginHandle;
use crate::loader::PluginConnector;
use crate::manifest::UsedManifest;

/// Discovers, loads and tracks the plugins of one host.
///
/// Child process cleanup is not done here; the host terminates plugin
/// processes on exit (see [`ProcessConnector::cleanup_clients`]).
///
/// [`ProcessConnector::cleanup_clients`]: crate::ProcessConnector::cleanup_clients
pub struct PluginManager {
    config: PluginConfig,
    builtins: BuiltinRegistry,
    connector: Arc<dyn PluginConnector>,
    external: Vec<ExternalPlugin>,
    plugins: Option<Vec<Arc<PluginHandle>>>,
}

impl PluginManager {
    /// Create a manager. Nothing is discovered or launched yet.
    pub fn new(
        config: PluginConfig,
        builtins: BuiltinRegistry,
        connector: Arc<dyn PluginConnector>,
    ) -> Self {
        Self {
            config,
            builtins,
            connector,
            external: Vec::new(),
            plugins: None,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Register a plugin outside the built-in set and plugin directories.
    /// Takes effect on the next [`discover`](Self::discover).
    pub fn register(&mut self, path: impl Into<PathBuf>, args: Vec<String>) {
        self.external.push(ExternalPlugin {
            path: path.into(),
            args,
        });
    }

    /// The current handle set, in load order.
    pub fn plugins(&self) -> &[Arc<PluginHandle>] {
        self.plugins.as_deref().unwrap_or(&[])
    }

    // === Discovery ===

    /// Find all available plugins, replacing any previously discovered set.
    pub fn discover(&mut self) -> Result<&[Arc<PluginHandle>]> {
        let handles = discover(&self.config, &self.builtins, &self.external)?;
        let handles = self.plugins.insert(handles);
        Ok(handles.as_slice())
    }

    // === Loading ===

    /// Launch every plugin in the set, discovering first if no set exists.
    ///
    /// All plugins are attempted. Failures are returned together; the
    /// plugins that loaded remain usable.
    pub async fn load_all(&mut self) -> Result<()> {
        if self.plugins.is_none() {
            self.discover()?;
        }

        let pending: Vec<Arc<PluginHandle>> = self
            .plugins()
            .iter()
            .filter(|h| !h.is_loaded())
            .cloned()
            .collect();
        let total = pending.len();

        let connector = self.connector.clone();
        let verify = self.config.verify_integrity;
        let result = run_bounded(pending, self.config.max_parallel, move |handle| {
            let connector = connector.clone();
            async move {
                handle
                    .load(connector.as_ref(), verify)
                    .await
                    .map_err(|e| HostError::PluginLoad {
                        plugin: handle.path().to_path_buf(),
                        source: Box::new(e),
                    })
            }
        })
        .await;

        let failed = match &result {
            Err(HostError::Aggregate(agg)) => agg.len(),
            Err(_) => total,
            Ok(()) => 0,
        };
        tracing::info!("Loaded {} of {} plugins", total.saturating_sub(failed), total);

        result
    }

    /// Install every loaded plugin's factory into the core capability table.
    ///
    /// Later plugins override earlier ones for the same tuple.
    pub fn configure_core(&self, core: &mut CoreConfig) -> Result<()> {
        let table = core.capabilities.get_or_insert_with(HashMap::new);

        for handle in self.plugins() {
            let (meta, factory) = match (handle.meta(), handle.factory()) {
                (Some(meta), Some(factory)) => (meta, factory),
                _ => continue,
            };
            for tuple in &meta.tuples {
                if table.insert(tuple.clone(), factory.clone()).is_some() {
                    tracing::debug!("Capability {} overridden by {}", tuple, handle);
                }
            }
        }

        Ok(())
    }

    // === Used-plugin cache ===

    /// Persist the plugins that were used, with fresh hashes, to `path`.
    ///
    /// Nothing is written, and no handle's recorded hash changes, if any
    /// hash fails.
    pub async fn store_used(&self, path: &Path) -> Result<()> {
        let used: Vec<Arc<PluginHandle>> = self
            .plugins()
            .iter()
            .filter(|h| h.used())
            .cloned()
            .collect();

        let hashes = hash_all(used.clone(), self.config.max_parallel, |handle| async move {
            handle.compute_integrity_hash().await
        })
        .await?;
        for (handle, hash) in hashes {
            handle.set_integrity_hash(hash);
        }

        UsedManifest::from_handles(&used).write(path)?;
        tracing::info!("Stored {} used plugins to {:?}", used.len(), path);
        Ok(())
    }

    /// Replace the handle set with the plugins stored at `path` and load them.
    ///
    /// The current set is left untouched if the manifest cannot be read.
    pub async fn load_used(&mut self, path: &Path) -> Result<()> {
        let manifest = UsedManifest::read(path)?;
        tracing::debug!("Loading {} used plugins from {:?}", manifest.plugins.len(), path);

        self.plugins = Some(manifest.into_handles());
        self.load_all().await
    }
}

/// Hash every handle with at most `permits` running at once. Results come
/// back only when all of them succeed.
async fn hash_all<F, Fut>(
    handles: Vec<Arc<PluginHandle>>,
    permits: usize,
    hash: F,
) -> Result<Vec<(Arc<PluginHandle>, String)>>
where
    F: Fn(Arc<PluginHandle>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    let hashes = Arc::new(Mutex::new(Vec::with_capacity(handles.len())));
    let hash = Arc::new(hash);

    let sink = hashes.clone();
    run_bounded(handles, permits, move |handle| {
        let hashes = sink.clone();
        let hash = hash.clone();
        async move {
            match (*hash)(handle.clone()).await {
                Ok(value) => {
                    hashes.lock().await.push((handle, value));
                    Ok(())
                }
                Err(HostError::Io(source)) => Err(HostError::Hash {
                    path: handle.path().to_path_buf(),
                    source,
                }),
                Err(e) => Err(e),
            }
        }
    })
    .await?;

    let mut collected = hashes.lock().await;
    Ok(std::mem::take(&mut *collected))
}
