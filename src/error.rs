//! Error types for plugin manager operations.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while discovering, loading or caching plugins.
#[derive(Debug, Error)]
pub enum HostError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Plugin process could not be started
    #[error("Failed to launch plugin {path:?}: {reason}")]
    Launch { path: PathBuf, reason: String },

    /// Protocol negotiation with a launched process failed
    #[error("Plugin handshake failed: {0}")]
    Handshake(String),

    /// Plugin returned malformed or absent capability metadata
    #[error("Plugin metadata unavailable: {0}")]
    Metadata(String),

    /// Manifest could not be deserialized
    #[error("Failed to parse used plugin manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// Manifest written by a newer build
    #[error(
        "Couldn't load used plugins because the stored manifest uses format version \
         {found}, but this build only understands up to version {supported}.\n\n\
         This is usually caused by a newer version of the host writing the manifest. \
         Please use a later version to read it."
    )]
    VersionMismatch { found: u32, supported: u32 },

    /// Live executable content no longer matches the recorded hash
    #[error("Integrity check failed for {path:?}: expected md5 {expected}, got {actual}")]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Handle was already loaded
    #[error("Plugin already loaded: {0}")]
    AlreadyLoaded(String),

    /// Re-exec named a built-in this build does not have
    #[error("Unknown built-in plugin: {0:?}")]
    UnknownBuiltin(String),

    /// Loading a single plugin failed
    #[error("Error loading plugin {plugin:?}: {source}")]
    PluginLoad {
        plugin: PathBuf,
        #[source]
        source: Box<HostError>,
    },

    /// Hashing a single plugin failed
    #[error("Error calculating MD5 of {path:?}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A batch worker panicked or was cancelled
    #[error("Plugin worker task failed: {0}")]
    TaskFailed(String),

    /// Several per-plugin failures from one batch
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Failures collected from every unit of a batch operation.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<HostError>,
}

impl AggregateError {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure.
    pub fn push(&mut self, error: HostError) {
        self.errors.push(error);
    }

    /// The collected failures, in completion order.
    pub fn errors(&self) -> &[HostError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was collected, otherwise the aggregate itself.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(HostError::Aggregate(self))
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 { "error" } else { "errors" };
        write!(f, "{} {} occurred:", self.errors.len(), noun)?;
        for error in &self.errors {
            write!(f, "\n\t* {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

impl IntoIterator for AggregateError {
    type Item = HostError;
    type IntoIter = std::vec::IntoIter<HostError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Result type for plugin manager operations
pub type Result<T> = std::result::Result<T, HostError>;
