//! Named pub/sub buses with topic broadcast

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::{BusError, Result, Signal};

const DEFAULT_CAPACITY: usize = 256;

/// A running bus: topics fan signals out to every current subscriber
#[derive(Debug)]
pub struct PubSub {
    name: String,
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<Signal>>>,
}

impl PubSub {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Signal> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.subscribe();
        }

        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send to every subscriber of `topic`. Returns the number of receivers.
    pub fn broadcast(&self, topic: &str, signal: Signal) -> usize {
        let topics = self.topics.read();
        let Some(sender) = topics.get(topic) else {
            trace!("◆ {}:{} HAS NO SUBSCRIBERS", self.name, topic);
            return 0;
        };

        match sender.send(signal) {
            Ok(receivers) => receivers,
            Err(_) => 0,
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

/// Table of running buses keyed by name
#[derive(Debug, Clone, Default)]
pub struct BusRegistry {
    buses: Arc<RwLock<HashMap<String, Arc<PubSub>>>>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static BusRegistry {
        static GLOBAL: OnceLock<BusRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BusRegistry::new)
    }

    /// Start a bus, or return the one already running under `name`
    pub fn start(&self, name: &str) -> Arc<PubSub> {
        if let Some(bus) = self.buses.read().get(name) {
            return bus.clone();
        }

        let mut buses = self.buses.write();
        buses
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("◆ BUS {} STARTED", name);
                Arc::new(PubSub::new(name))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<PubSub>> {
        self.buses.read().get(name).cloned()
    }

    /// Resolve a running bus, failing with `BusNotRunning`
    pub fn running(&self, name: &str) -> Result<Arc<PubSub>> {
        self.get(name)
            .ok_or_else(|| BusError::BusNotRunning(name.to_string()))
    }

    pub fn stop(&self, name: &str) -> bool {
        let stopped = self.buses.write().remove(name).is_some();
        if stopped {
            debug!("◆ BUS {} STOPPED", name);
        }
        stopped
    }
}
