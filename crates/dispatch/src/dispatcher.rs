//! Adapter registry and the breaker-guarded delivery entry point

use futures::future::join_all;
use marshal_bus::{BusRegistry, ProcessRegistry};
use marshal_config::{Config, HttpConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::adapters::{
    ConsoleAdapter, Delivery, DispatchAdapter, HttpAdapter, LoggerAdapter, NamedAdapter,
    NoopAdapter, PidAdapter, PubSubAdapter, WebhookAdapter,
};
use crate::{BreakerOptions, BreakerRegistry, DispatchConfig, DispatchError, DispatchTarget, Result, Signal};

type SharedAdapter = Arc<dyn DispatchAdapter>;

/// Routes signals to adapters by type, each delivery under its breaker
#[derive(Clone)]
pub struct Dispatcher {
    adapters: HashMap<String, SharedAdapter>,
    breakers: Arc<BreakerRegistry>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("adapters", &self.adapter_types())
            .field("breakers", &self.breakers)
            .finish()
    }
}

impl Dispatcher {
    /// Empty dispatcher over the given breakers
    pub fn new(breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            adapters: HashMap::new(),
            breakers,
        }
    }

    /// Every built-in adapter over the process-wide registries
    pub fn with_defaults() -> Self {
        Self::with_registries(
            ProcessRegistry::global().clone(),
            BusRegistry::global().clone(),
            BreakerRegistry::global(),
            HttpConfig::default(),
        )
    }

    /// Every built-in adapter over caller-owned registries
    pub fn with_registries(
        processes: ProcessRegistry,
        buses: BusRegistry,
        breakers: Arc<BreakerRegistry>,
        http: HttpConfig,
    ) -> Self {
        let http = HttpAdapter::new(http);

        let mut dispatcher = Self::new(breakers);
        dispatcher.register(PidAdapter::new(processes.clone()));
        dispatcher.register(NamedAdapter::new(processes));
        dispatcher.register(PubSubAdapter::new(buses));
        dispatcher.register(WebhookAdapter::new(http.clone()));
        dispatcher.register(http);
        dispatcher.register(LoggerAdapter);
        dispatcher.register(ConsoleAdapter);
        dispatcher.register(NoopAdapter);
        dispatcher
    }

    /// Built-ins over the global registries, with breakers and HTTP defaults
    /// taken from `config`
    pub fn from_config(config: &Config) -> Self {
        let breakers = BreakerRegistry::global();
        let options = BreakerOptions::from(&config.breaker);
        let dispatcher = Self::with_registries(
            ProcessRegistry::global().clone(),
            BusRegistry::global().clone(),
            breakers,
            config.http.clone(),
        );
        for adapter_type in dispatcher.adapter_types() {
            dispatcher.breakers.install(&adapter_type, Some(options));
        }
        dispatcher
    }

    /// Add or replace the adapter for its type
    pub fn register<A: DispatchAdapter + 'static>(&mut self, adapter: A) {
        let adapter_type = adapter.adapter_type().to_string();
        debug!("◆ ADAPTER {} REGISTERED", adapter_type);
        self.adapters.insert(adapter_type, Arc::new(adapter));
    }

    pub fn has(&self, adapter_type: &str) -> bool {
        self.adapters.contains_key(adapter_type)
    }

    pub fn adapter_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.adapters.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Validate `config` without delivering anything
    pub fn validate(&self, config: &DispatchConfig) -> Result<(SharedAdapter, DispatchConfig)> {
        let adapter = self
            .adapters
            .get(&config.adapter_type)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownAdapter(config.adapter_type.clone()))?;
        let options = adapter.validate_opts(&config.options)?;
        Ok((
            adapter,
            DispatchConfig {
                adapter_type: config.adapter_type.clone(),
                options,
            },
        ))
    }

    /// Deliver one signal. Validation failures are returned before the
    /// breaker is consulted and never count against it.
    pub async fn dispatch(&self, signal: &Signal, config: &DispatchConfig) -> Result<Delivery> {
        let (adapter, validated) = self.validate(config)?;

        debug!(
            "◆ DISPATCH {} {} VIA {}",
            signal.signal_type, signal.id, validated.adapter_type
        );
        self.breakers
            .run(
                &validated.adapter_type,
                adapter.deliver(signal, &validated.options),
            )
            .await
    }

    /// Deliver to every config of `target` concurrently. Results come back in
    /// the order of the configs.
    pub async fn dispatch_all(
        &self,
        signal: &Signal,
        target: &DispatchTarget,
    ) -> Vec<Result<Delivery>> {
        join_all(
            target
                .configs()
                .iter()
                .map(|config| self.dispatch(signal, config)),
        )
        .await
    }

    /// Deliver in the background, logging the outcome
    pub fn dispatch_detached(&self, signal: Signal, target: DispatchTarget) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let results = dispatcher.dispatch_all(&signal, &target).await;
            for (config, result) in target.configs().iter().zip(results) {
                match result {
                    Ok(_) => info!(
                        "◆ SIGNAL {} DELIVERED VIA {}",
                        signal.signal_type, config.adapter_type
                    ),
                    Err(e) => error!(
                        "◆ SIGNAL {} FAILED VIA {}: {}",
                        signal.signal_type, config.adapter_type, e
                    ),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BUILTIN;

    fn isolated() -> Dispatcher {
        Dispatcher::with_registries(
            ProcessRegistry::new(),
            BusRegistry::new(),
            Arc::new(BreakerRegistry::new()),
            HttpConfig::default(),
        )
    }

    #[test]
    fn test_builtins_registered() {
        let dispatcher = isolated();
        let mut expected: Vec<String> = BUILTIN.iter().map(|t| t.to_string()).collect();
        expected.sort();
        assert_eq!(dispatcher.adapter_types(), expected);
    }

    #[test]
    fn test_validate_unknown_adapter() {
        let err = isolated()
            .validate(&DispatchConfig::new("smtp"))
            .err()
            .unwrap();
        assert_eq!(err, DispatchError::UnknownAdapter("smtp".to_string()));
    }

    #[tokio::test]
    async fn test_validation_errors_skip_breaker() {
        let dispatcher = isolated();
        let bad = DispatchConfig::http("nope");

        for _ in 0..10 {
            let err = dispatcher
                .dispatch(&Signal::new("t", "/s"), &bad)
                .await
                .unwrap_err();
            assert!(err.is_validation());
        }
        assert!(dispatcher.breakers().get("http").is_none());
    }
}
