//! Capabilities offered by plugins and the core table they populate.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::loader::PluginClient;

/// Key identifying something a plugin can produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityTuple {
    pub domain: String,
    pub variant: String,
}

impl CapabilityTuple {
    pub fn new(domain: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for CapabilityTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.variant)
    }
}

/// Static metadata a plugin reports after launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMeta {
    pub tuples: Vec<CapabilityTuple>,
}

/// A live capability served by a plugin process.
///
/// Implemented by the host's transport layer.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Describe the capability tuples this provider serves.
    async fn meta(&self) -> Result<PluginMeta>;

    /// Send a request to the plugin and return its response payload.
    async fn invoke(&self, method: &str, payload: &str) -> Result<String>;

    /// Release the provider. Providers without resources keep the default.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Produces capability instances from a loaded plugin and records that it
/// was used.
#[derive(Clone)]
pub struct CapabilityFactory {
    client: Arc<dyn PluginClient>,
    used: Arc<AtomicBool>,
}

impl CapabilityFactory {
    pub(crate) fn new(client: Arc<dyn PluginClient>, used: Arc<AtomicBool>) -> Self {
        Self { client, used }
    }

    /// Produce a new capability instance, marking the owning plugin as used.
    pub async fn produce(&self) -> Result<Box<dyn CapabilityProvider>> {
        self.used.store(true, Ordering::Release);
        self.client.provider().await
    }

    /// Whether this factory shares its usage flag with `other`.
    pub fn same_plugin(&self, other: &CapabilityFactory) -> bool {
        Arc::ptr_eq(&self.used, &other.used)
    }
}

impl fmt::Debug for CapabilityFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityFactory")
            .field("used", &self.used.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Host core configuration populated from loaded plugins.
#[derive(Debug, Default)]
pub struct CoreConfig {
    /// Capability table; `None` until first configured
    pub capabilities: Option<HashMap<CapabilityTuple, CapabilityFactory>>,
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the factory for a tuple.
    pub fn factory(&self, tuple: &CapabilityTuple) -> Option<&CapabilityFactory> {
        self.capabilities.as_ref()?.get(tuple)
    }
}
