//! A single plugin: how to invoke it and, once loaded, what it provides.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use tokio::io::AsyncReadExt;

use crate::capability::{CapabilityFactory, PluginMeta};
use crate::error::{HostError, Result};
use crate::loader::PluginConnector;

const HASH_CHUNK: usize = 64 * 1024;

/// A plugin invocation recipe plus its post-load state.
pub struct PluginHandle {
    path: PathBuf,
    args: Vec<String>,
    integrity_hash: RwLock<Option<String>>,
    meta: OnceLock<PluginMeta>,
    factory: OnceLock<CapabilityFactory>,
    used: Arc<AtomicBool>,
}

impl PluginHandle {
    /// Create a handle that launches `path` with `args`.
    pub fn new(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            path: path.into(),
            args,
            integrity_hash: RwLock::new(None),
            meta: OnceLock::new(),
            factory: OnceLock::new(),
            used: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach an expected content hash, verified on load.
    pub fn with_integrity_hash(self, hash: impl Into<String>) -> Self {
        if let Ok(mut slot) = self.integrity_hash.write() {
            *slot = Some(hash.into());
        }
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The recorded content hash, if any.
    pub fn integrity_hash(&self) -> Option<String> {
        self.integrity_hash.read().ok()?.clone()
    }

    /// Metadata reported by the plugin; `None` until loaded.
    pub fn meta(&self) -> Option<&PluginMeta> {
        self.meta.get()
    }

    /// Capability factory; `None` until loaded.
    pub fn factory(&self) -> Option<&CapabilityFactory> {
        self.factory.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.factory.get().is_some()
    }

    /// Whether the capability factory has ever been invoked.
    pub fn used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    /// MD5 hex digest of the executable's current content.
    pub async fn compute_integrity_hash(&self) -> Result<String> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let mut context = md5::Context::new();
        let mut buf = vec![0u8; HASH_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            context.consume(&buf[..n]);
        }
        Ok(format!("{:x}", context.compute()))
    }

    /// Compute the content hash and record it on the handle.
    pub async fn refresh_integrity_hash(&self) -> Result<String> {
        let hash = self.compute_integrity_hash().await?;
        self.set_integrity_hash(hash.clone());
        Ok(hash)
    }

    pub(crate) fn set_integrity_hash(&self, hash: String) {
        if let Ok(mut slot) = self.integrity_hash.write() {
            *slot = Some(hash);
        }
    }

    /// Launch the plugin, read its metadata and install the usage-tracking
    /// factory.
    ///
    /// When `verify` is set and the handle carries a hash, the live file
    /// must match it before anything is spawned.
    pub async fn load(&self, connector: &dyn PluginConnector, verify: bool) -> Result<()> {
        if self.is_loaded() {
            return Err(HostError::AlreadyLoaded(self.to_string()));
        }

        if verify {
            self.verify_integrity().await?;
        }

        let client = connector.connect(&self.path, &self.args).await?;
        let provider = client.provider().await.map_err(|e| match e {
            HostError::Handshake(_) | HostError::Launch { .. } => e,
            other => HostError::Handshake(other.to_string()),
        })?;

        let meta = provider.meta().await;
        if let Err(e) = provider.close().await {
            tracing::warn!("Failed to close metadata provider for {}: {}", self, e);
        }
        let meta = meta.map_err(|e| match e {
            HostError::Metadata(_) => e,
            other => HostError::Metadata(other.to_string()),
        })?;

        tracing::debug!("Loaded plugin {} providing {} capabilities", self, meta.tuples.len());

        let factory = CapabilityFactory::new(client, self.used.clone());
        // A concurrent load of the same handle may have won; keep the first.
        if self.meta.set(meta).is_err() || self.factory.set(factory).is_err() {
            return Err(HostError::AlreadyLoaded(self.to_string()));
        }
        Ok(())
    }

    async fn verify_integrity(&self) -> Result<()> {
        let expected = match self.integrity_hash() {
            Some(hash) if !hash.is_empty() => hash,
            _ => return Ok(()),
        };

        let actual = self.compute_integrity_hash().await?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(HostError::IntegrityMismatch {
                path: self.path.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Display for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.path.display(), self.args)
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("path", &self.path)
            .field("args", &self.args)
            .field("integrity_hash", &self.integrity_hash())
            .field("loaded", &self.is_loaded())
            .field("used", &self.used())
            .finish()
    }
}
