//! Built-in plugins served by re-executing the host binary.
//!
//! A built-in is reachable as `<host-exe> plugin-builtin <selector>`. The
//! host calls [`BuiltinRegistry::dispatch`] early in `main` so that such an
//! invocation serves the requested built-in instead of running normally.

use std::fmt;
use std::sync::Arc;

use crate::error::{HostError, Result};

/// First argument marking a built-in plugin invocation.
pub const BUILTIN_ARG: &str = "plugin-builtin";

type ServeFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Ordered set of built-in capabilities compiled into the host.
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    entries: Vec<(String, ServeFn)>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in. Re-registering a selector replaces its server
    /// but keeps its original position.
    pub fn register<F>(&mut self, selector: impl Into<String>, serve: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        let selector = selector.into();
        let serve: ServeFn = Arc::new(serve);
        match self.entries.iter_mut().find(|(name, _)| *name == selector) {
            Some(entry) => entry.1 = serve,
            None => self.entries.push((selector, serve)),
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, selector: impl Into<String>, serve: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.register(selector, serve);
        self
    }

    /// Selectors in registration order.
    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arguments that select `selector` on a re-exec of the host.
    pub fn args_for(selector: &str) -> Vec<String> {
        vec![BUILTIN_ARG.to_string(), selector.to_string()]
    }

    /// Serve the built-in named by `args` (without the program name).
    ///
    /// Returns `None` only when `args` is not a built-in invocation, in which
    /// case the host continues normally. A built-in invocation naming an
    /// unknown or missing selector is an error; the host must not fall
    /// through to its normal run.
    pub fn dispatch(&self, args: &[String]) -> Option<Result<()>> {
        let selector = match args {
            [flag, selector, ..] if flag == BUILTIN_ARG => selector.as_str(),
            [flag] if flag == BUILTIN_ARG => "",
            _ => return None,
        };

        match self.entries.iter().find(|(name, _)| name == selector) {
            Some((_, serve)) => {
                tracing::debug!("Serving built-in plugin: {}", selector);
                Some(serve())
            }
            None => Some(Err(HostError::UnknownBuiltin(selector.to_string()))),
        }
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.selectors()).finish()
    }
}
