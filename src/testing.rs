//! In-process stand-ins for plugin processes used by unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::capability::{CapabilityProvider, CapabilityTuple, PluginMeta};
use crate::error::{HostError, Result};
use crate::loader::{PluginClient, PluginConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Ok,
    FailLaunch,
    FailHandshake,
    FailProvider,
    FailMeta,
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    closed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Connector whose plugins are keyed by path or by their last argument.
#[derive(Default)]
pub struct MockConnector {
    behaviors: HashMap<String, MockBehavior>,
    tuples: HashMap<String, Vec<CapabilityTuple>>,
    delay: Option<Duration>,
    counters: Arc<Counters>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, key: &str, behavior: MockBehavior) -> Self {
        self.behaviors.insert(key.to_string(), behavior);
        self
    }

    pub fn with_tuples(mut self, key: &str, tuples: Vec<CapabilityTuple>) -> Self {
        self.tuples.insert(key.to_string(), tuples);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    fn lookup<'a, T>(map: &'a HashMap<String, T>, path: &Path, args: &[String]) -> Option<&'a T> {
        args.last()
            .and_then(|arg| map.get(arg))
            .or_else(|| map.get(&*path.to_string_lossy()))
    }
}

#[async_trait]
impl PluginConnector for MockConnector {
    async fn connect(&self, path: &Path, args: &[String]) -> Result<Arc<dyn PluginClient>> {
        let counters = &self.counters;
        counters.connects.fetch_add(1, Ordering::SeqCst);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        let behavior = Self::lookup(&self.behaviors, path, args)
            .copied()
            .unwrap_or(MockBehavior::Ok);
        match behavior {
            MockBehavior::FailLaunch => Err(HostError::Launch {
                path: path.to_path_buf(),
                reason: "mock launch failure".to_string(),
            }),
            MockBehavior::FailHandshake => {
                Err(HostError::Handshake("mock handshake failure".to_string()))
            }
            MockBehavior::Ok | MockBehavior::FailProvider | MockBehavior::FailMeta => {
                Ok(Arc::new(MockClient {
                    tuples: Self::lookup(&self.tuples, path, args).cloned().unwrap_or_default(),
                    fail_provider: behavior == MockBehavior::FailProvider,
                    fail_meta: behavior == MockBehavior::FailMeta,
                    counters: self.counters.clone(),
                }))
            }
        }
    }
}

pub struct MockClient {
    tuples: Vec<CapabilityTuple>,
    fail_provider: bool,
    fail_meta: bool,
    counters: Arc<Counters>,
}

impl MockClient {
    pub fn arc(tuples: Vec<CapabilityTuple>) -> Arc<dyn PluginClient> {
        Arc::new(Self {
            tuples,
            fail_provider: false,
            fail_meta: false,
            counters: Arc::new(Counters::default()),
        })
    }
}

#[async_trait]
impl PluginClient for MockClient {
    async fn provider(&self) -> Result<Box<dyn CapabilityProvider>> {
        if self.fail_provider {
            return Err(HostError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock provider failure",
            )));
        }
        Ok(Box::new(MockProvider {
            tuples: self.tuples.clone(),
            fail_meta: self.fail_meta,
            counters: self.counters.clone(),
        }))
    }
}

struct MockProvider {
    tuples: Vec<CapabilityTuple>,
    fail_meta: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl CapabilityProvider for MockProvider {
    async fn meta(&self) -> Result<PluginMeta> {
        if self.fail_meta {
            return Err(HostError::Metadata("mock metadata failure".to_string()));
        }
        Ok(PluginMeta {
            tuples: self.tuples.clone(),
        })
    }

    async fn invoke(&self, method: &str, payload: &str) -> Result<String> {
        Ok(format!("{}:{}", method, payload))
    }

    async fn close(&self) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
