//! The used-plugin manifest persisted between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{HostError, Result};
use crate::handle::PluginHandle;

/// Newest manifest format this build reads and the one it writes.
pub const USED_PLUGIN_VERSION: u32 = 1;

/// One used plugin as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub md5: String,
}

// Older writers emit `null` for empty lists.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ManifestEntry {
    /// Snapshot a handle, including its recorded hash.
    pub fn from_handle(handle: &PluginHandle) -> Self {
        Self {
            path: handle.path().to_path_buf(),
            args: handle.args().to_vec(),
            md5: handle.integrity_hash().unwrap_or_default(),
        }
    }

    /// Re-hydrate an unloaded handle carrying the stored hash.
    pub fn into_handle(self) -> PluginHandle {
        let handle = PluginHandle::new(self.path, self.args);
        if self.md5.is_empty() {
            handle
        } else {
            handle.with_integrity_hash(self.md5)
        }
    }
}

/// Versioned list of plugins that were actually used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedManifest {
    pub version: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plugins: Vec<ManifestEntry>,
}

impl UsedManifest {
    /// Build a current-version manifest from handles.
    pub fn from_handles<'a>(handles: impl IntoIterator<Item = &'a Arc<PluginHandle>>) -> Self {
        Self {
            version: USED_PLUGIN_VERSION,
            plugins: handles
                .into_iter()
                .map(|h| ManifestEntry::from_handle(h))
                .collect(),
        }
    }

    /// Read a manifest, rejecting formats newer than this build understands.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: UsedManifest = serde_json::from_str(&content)?;

        if manifest.version > USED_PLUGIN_VERSION {
            return Err(HostError::VersionMismatch {
                found: manifest.version,
                supported: USED_PLUGIN_VERSION,
            });
        }
        Ok(manifest)
    }

    /// Write the manifest, replacing any existing file.
    ///
    /// A plugin path that cannot be encoded (not valid UTF-8) is an IO error,
    /// not a parse error.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut content =
            serde_json::to_string(self).map_err(|e| HostError::Io(std::io::Error::from(e)))?;
        content.push('\n');
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Fresh, unloaded handles in manifest order.
    pub fn into_handles(self) -> Vec<Arc<PluginHandle>> {
        self.plugins
            .into_iter()
            .map(|entry| Arc::new(entry.into_handle()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_version_one_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used.json");
        std::fs::write(
            &path,
            r#"{"version":1,"plugins":[{"path":"/usr/bin/host","args":["plugin-builtin","build"],"md5":"abc123"}]}"#,
        )
        .unwrap();

        let manifest = UsedManifest::read(&path).unwrap();
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.plugins.len(), 1);
        assert_eq!(manifest.plugins[0].args, vec!["plugin-builtin", "build"]);

        let handles = manifest.into_handles();
        assert_eq!(handles[0].integrity_hash().as_deref(), Some("abc123"));
        assert!(!handles[0].is_loaded());
    }

    #[test]
    fn test_written_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used.json");
        let handle = Arc::new(
            PluginHandle::new("/usr/bin/host", vec!["x".into()]).with_integrity_hash("ff"),
        );
        UsedManifest::from_handles([&handle]).write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "version": 1,
                "plugins": [{"path": "/usr/bin/host", "args": ["x"], "md5": "ff"}]
            })
        );
    }

    #[test]
    fn test_null_args_and_missing_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used.json");
        std::fs::write(&path, r#"{"version":1,"plugins":[{"path":"/opt/plugin-x","args":null}]}"#)
            .unwrap();

        let manifest = UsedManifest::read(&path).unwrap();
        assert!(manifest.plugins[0].args.is_empty());
        assert!(manifest.plugins[0].md5.is_empty());
        assert!(manifest.into_handles()[0].integrity_hash().is_none());
    }

    #[test]
    fn test_null_plugin_list_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used.json");
        std::fs::write(&path, r#"{"version":1,"plugins":null}"#).unwrap();

        let manifest = UsedManifest::read(&path).unwrap();
        assert!(manifest.plugins.is_empty());
        assert!(manifest.into_handles().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unencodable_path_is_io_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used.json");
        let handle = Arc::new(PluginHandle::new(OsStr::from_bytes(b"/opt/plugin-\xff"), vec![]));

        let err = UsedManifest::from_handles([&handle]).write(&path).unwrap_err();
        assert!(matches!(err, HostError::Io(_)), "{}", err);
        assert!(!path.exists());
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used.json");
        std::fs::write(&path, r#"{"version":2,"plugins":[]}"#).unwrap();

        let err = UsedManifest::read(&path).unwrap_err();
        assert!(matches!(err, HostError::VersionMismatch { found: 2, supported: 1 }));
    }

    #[test]
    fn test_malformed_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("used.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(UsedManifest::read(&path).unwrap_err(), HostError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = UsedManifest::read(Path::new("/nonexistent/used.json")).unwrap_err();
        assert!(matches!(err, HostError::Io(_)));
    }
}
