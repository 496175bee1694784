//! Plugin manager configuration.

use std::path::PathBuf;

/// File name prefix that marks an executable in a plugin directory as a plugin.
pub const DEFAULT_PLUGIN_PREFIX: &str = "plugin-";

/// Configuration for the plugin manager.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Directories scanned for plugin executables. Later directories
    /// override capabilities provided by earlier ones.
    pub plugin_dirs: Vec<PathBuf>,

    /// File name prefix of plugin executables
    pub plugin_prefix: String,

    /// Maximum number of plugins loaded or hashed at once
    pub max_parallel: usize,

    /// Skip the built-in re-exec set during discovery (deterministic tests)
    pub skip_builtins: bool,

    /// Verify a handle's recorded hash against the live file before launching
    pub verify_integrity: bool,
}

impl PluginConfig {
    /// Create a new configuration scanning the given directories.
    pub fn new(plugin_dirs: Vec<PathBuf>) -> Self {
        Self {
            plugin_dirs,
            plugin_prefix: DEFAULT_PLUGIN_PREFIX.to_string(),
            max_parallel: available_parallelism(),
            skip_builtins: false,
            verify_integrity: true,
        }
    }

    /// Add a plugin directory.
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dirs.push(dir.into());
        self
    }

    /// Set the plugin file name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.plugin_prefix = prefix.into();
        self
    }

    /// Bound the number of concurrent load/hash operations. Zero is treated as one.
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    /// Suppress built-in plugin discovery.
    pub fn skip_builtins(mut self, skip: bool) -> Self {
        self.skip_builtins = skip;
        self
    }

    /// Enable or disable load-time integrity verification.
    pub fn verify_integrity(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        // Use platform-appropriate default directory
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(vec![data_dir.join("plugins")])
    }
}

/// Number of available processing units, at least one.
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
