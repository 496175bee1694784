//! Plugin discovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builtin::BuiltinRegistry;
use crate::config::PluginConfig;
use crate::error::Result;
use crate::handle::PluginHandle;

/// An invocation registered by the host outside of discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPlugin {
    pub path: PathBuf,
    pub args: Vec<String>,
}

/// Build the candidate handle list.
///
/// Order: built-ins (registry order), then executables found in each
/// plugin directory (directory order, file name order within a directory),
/// then externally registered plugins. Later handles override earlier
/// ones when the core is configured.
pub fn discover(
    config: &PluginConfig,
    builtins: &BuiltinRegistry,
    external: &[ExternalPlugin],
) -> Result<Vec<Arc<PluginHandle>>> {
    let mut result = Vec::with_capacity(builtins.len() + external.len());

    if !config.skip_builtins && !builtins.is_empty() {
        let exe = std::env::current_exe()?;
        for selector in builtins.selectors() {
            result.push(Arc::new(PluginHandle::new(
                exe.clone(),
                BuiltinRegistry::args_for(selector),
            )));
        }
    }

    for dir in &config.plugin_dirs {
        for path in scan_dir(dir, &config.plugin_prefix)? {
            result.push(Arc::new(PluginHandle::new(path, Vec::new())));
        }
    }

    for plugin in external {
        result.push(Arc::new(PluginHandle::new(
            plugin.path.clone(),
            plugin.args.clone(),
        )));
    }

    for handle in &result {
        tracing::debug!("Detected plugin: {}", handle);
    }

    Ok(result)
}

/// Executables in `dir` whose file name starts with `prefix`, sorted by name.
fn scan_dir(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let matches_prefix = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(prefix))
            .unwrap_or(false);
        if !matches_prefix || !path.is_file() || !is_executable(&path) {
            continue;
        }
        found.push(path);
    }

    found.sort();
    Ok(found)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}
