//! Discovery, launching and caching of out-of-process plugins.
//!
//! Plugins are executables that speak a host-defined protocol. The manager
//! finds them (built-ins served by re-executing the host, executables in
//! plugin directories, explicitly registered ones), launches them in
//! parallel, exposes their capabilities to the host's core configuration
//! and remembers which were actually used so the next run can launch only
//! those.
//!
//! # Example
//!
//! ```rust,ignore
//! use plugin_manager::{BuiltinRegistry, CoreConfig, PluginConfig, PluginManager, ProcessConnector};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builtins = BuiltinRegistry::new()
//!         .with("build", serve_build)
//!         .with("deploy", serve_deploy);
//!
//!     // `<host> plugin-builtin <name>` serves a single built-in
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     if let Some(result) = builtins.dispatch(&args) {
//!         return Ok(result?);
//!     }
//!
//!     let connector = Arc::new(ProcessConnector::new(MyHandshake));
//!     let mut manager = PluginManager::new(PluginConfig::default(), builtins, connector.clone());
//!
//!     let cache = Path::new(".host/used-plugins.json");
//!     if cache.exists() {
//!         manager.load_used(cache).await?;
//!     } else {
//!         manager.load_all().await?;
//!     }
//!
//!     let mut core = CoreConfig::new();
//!     manager.configure_core(&mut core)?;
//!
//!     // ... run the host ...
//!
//!     manager.store_used(cache).await?;
//!     connector.cleanup_clients().await;
//!     Ok(())
//! }
//! ```

mod batch;
mod builtin;
mod capability;
mod config;
mod discovery;
mod error;
mod handle;
mod loader;
mod manager;
mod manifest;

#[cfg(test)]
mod testing;

pub use batch::*;
pub use builtin::*;
pub use capability::*;
pub use config::*;
pub use discovery::*;
pub use error::*;
pub use handle::*;
pub use loader::*;
pub use manager::*;
pub use manifest::*;
