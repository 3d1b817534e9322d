use async_trait::async_trait;
use marshal_bus::BusRegistry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_options, to_options, Delivery, DispatchAdapter, PUBSUB};
use crate::{DispatchError, Options, Result, Signal};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PubSubOptions {
    /// Bus name
    pub target: String,
    pub topic: String,
}

/// Broadcasts to every subscriber of a topic on a named bus
#[derive(Debug, Clone, Default)]
pub struct PubSubAdapter {
    buses: BusRegistry,
}

impl PubSubAdapter {
    pub fn new(buses: BusRegistry) -> Self {
        Self { buses }
    }
}

#[async_trait]
impl DispatchAdapter for PubSubAdapter {
    fn adapter_type(&self) -> &str {
        PUBSUB
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        let typed: PubSubOptions = parse_options(PUBSUB, options)?;
        if typed.target.is_empty() {
            return Err(DispatchError::invalid(PUBSUB, "target: must not be empty"));
        }
        if typed.topic.is_empty() {
            return Err(DispatchError::invalid(PUBSUB, "topic: must not be empty"));
        }
        to_options(PUBSUB, &typed)
    }

    async fn deliver(&self, signal: &Signal, options: &Options) -> Result<Delivery> {
        let opts: PubSubOptions = parse_options(PUBSUB, options)?;
        let bus = self.buses.running(&opts.target)?;

        let receivers = bus.broadcast(&opts.topic, signal.clone());
        debug!(
            "◆ PUBSUB {}:{} REACHED {} SUBSCRIBERS",
            opts.target, opts.topic, receivers
        );
        Ok(Delivery::Delivered)
    }
}
