//! Per-adapter-type circuit breakers
//!
//! A breaker is shared by every caller that delivers through the same adapter
//! type. Failures are counted in a sliding window; once the count reaches the
//! threshold the circuit opens ("blows") and calls are rejected with
//! [`DispatchError::CircuitOpen`] without being attempted. An open circuit
//! closes again on its own after the refresh interval, or on [`reset`].
//!
//! The breaker remembers when its last `max_failures` failures happened, in a
//! ring of atomic slots. The circuit opens when the oldest of them is no older
//! than the window, so a burst counts even when it straddles any boundary.
//! Unrelated deliveries never serialize on a lock.
//!
//! [`reset`]: CircuitBreaker::reset

use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{DispatchError, Result};

/// How failures melt the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStrategy {
    /// Open after `max_failures` failures within `window`
    Standard { max_failures: u32, window: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerOptions {
    pub strategy: BreakerStrategy,
    /// How long the circuit stays open
    pub refresh: Duration,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            strategy: BreakerStrategy::Standard {
                max_failures: 5,
                window: Duration::from_secs(10),
            },
            refresh: Duration::from_secs(30),
        }
    }
}

impl From<&marshal_config::BreakerConfig> for BreakerOptions {
    fn from(config: &marshal_config::BreakerConfig) -> Self {
        Self {
            strategy: BreakerStrategy::Standard {
                max_failures: config.max_failures.max(1),
                window: Duration::from_millis(config.window_ms),
            },
            refresh: Duration::from_millis(config.refresh_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    adapter_type: String,
    options: BreakerOptions,
    epoch: Instant,
    open: AtomicBool,
    /// Failure times in ms since `epoch`, offset by one so zero means empty
    stamps: Box<[AtomicU64]>,
    next: AtomicUsize,
    reset_at_ms: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(adapter_type: impl Into<String>, options: BreakerOptions) -> Self {
        let BreakerStrategy::Standard { max_failures, .. } = options.strategy;
        let stamps = (0..max_failures.max(1)).map(|_| AtomicU64::new(0)).collect();

        Self {
            adapter_type: adapter_type.into(),
            options,
            epoch: Instant::now(),
            open: AtomicBool::new(false),
            stamps,
            next: AtomicUsize::new(0),
            reset_at_ms: AtomicU64::new(0),
        }
    }

    pub fn adapter_type(&self) -> &str {
        &self.adapter_type
    }

    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn window_ms(&self) -> u64 {
        let BreakerStrategy::Standard { window, .. } = self.options.strategy;
        window.as_millis() as u64
    }

    fn within_window(&self, stamp: u64, now: u64) -> bool {
        stamp != 0 && now.saturating_sub(stamp - 1) <= self.window_ms()
    }

    fn forget_failures(&self) {
        for slot in self.stamps.iter() {
            slot.store(0, Ordering::Release);
        }
    }

    /// Current status. An open circuit past its deadline closes here.
    pub fn status(&self) -> BreakerStatus {
        if !self.open.load(Ordering::Acquire) {
            return BreakerStatus::Closed;
        }

        let now = self.now_ms();
        if now < self.reset_at_ms.load(Ordering::Acquire) {
            return BreakerStatus::Open;
        }

        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.forget_failures();
            info!("◆ CIRCUIT {} CLOSED AFTER REFRESH", self.adapter_type);
        }
        BreakerStatus::Closed
    }

    pub fn is_open(&self) -> bool {
        self.status() == BreakerStatus::Open
    }

    /// Failures inside the window ending now, capped at the threshold
    pub fn failure_count(&self) -> u32 {
        let now = self.now_ms();
        self.stamps
            .iter()
            .filter(|slot| self.within_window(slot.load(Ordering::Acquire), now))
            .count() as u32
    }

    /// Record one failure, opening the circuit at the threshold
    pub fn melt(&self) {
        let BreakerStrategy::Standard { max_failures, .. } = self.options.strategy;
        let now = self.now_ms();
        let len = self.stamps.len();

        let index = self.next.fetch_add(1, Ordering::AcqRel);
        self.stamps[index % len].store(now + 1, Ordering::Release);

        // The slot written next holds the oldest remembered failure
        let oldest = self.stamps[(index + 1) % len].load(Ordering::Acquire);
        let blown = self.within_window(oldest, now);
        debug!(
            "◆ CIRCUIT {} MELT {}/{}",
            self.adapter_type,
            self.failure_count(),
            max_failures
        );

        if blown && !self.open.load(Ordering::Acquire) {
            let deadline = now.saturating_add(self.options.refresh.as_millis() as u64);
            self.reset_at_ms.store(deadline, Ordering::Release);
            if self
                .open
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                warn!(
                    "◆ CIRCUIT {} BLOWN AFTER {} FAILURES",
                    self.adapter_type, max_failures
                );
            }
        }
    }
    /// Force the circuit closed and forget counted failures
    pub fn reset(&self) {
        self.forget_failures();
        self.open.store(false, Ordering::Release);
        info!("◆ CIRCUIT {} RESET", self.adapter_type);
    }

    /// Evaluate `call` unless the circuit is open. Errors and panics melt
    /// the breaker; successes pass through unchanged.
    pub async fn run<F, T>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_open() {
            debug!("◆ CIRCUIT {} OPEN, REJECTING", self.adapter_type);
            return Err(DispatchError::CircuitOpen(self.adapter_type.clone()));
        }

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                self.melt();
                Err(err)
            }
            Err(panic) => {
                self.melt();
                Err(DispatchError::Panicked(panic_message(panic)))
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Breakers keyed by adapter type
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    defaults: BreakerOptions,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: BreakerOptions) -> Self {
        Self {
            defaults,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide registry shared by every dispatcher and agent
    pub fn global() -> Arc<BreakerRegistry> {
        static GLOBAL: OnceLock<Arc<BreakerRegistry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(BreakerRegistry::new()))
            .clone()
    }

    /// Install a breaker for `adapter_type`. Installing twice returns the
    /// existing breaker and ignores the new options.
    pub fn install(
        &self,
        adapter_type: &str,
        options: Option<BreakerOptions>,
    ) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(adapter_type) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(adapter_type.to_string())
            .or_insert_with(|| {
                debug!("◆ CIRCUIT {} INSTALLED", adapter_type);
                Arc::new(CircuitBreaker::new(
                    adapter_type,
                    options.unwrap_or(self.defaults),
                ))
            })
            .clone()
    }

    pub fn get(&self, adapter_type: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(adapter_type).cloned()
    }

    /// Run `call` under the breaker for `adapter_type`, installing it on first use
    pub async fn run<F, T>(&self, adapter_type: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.install(adapter_type, None).run(call).await
    }

    /// Status of `adapter_type`; a type never used is closed
    pub fn status(&self, adapter_type: &str) -> BreakerStatus {
        self.get(adapter_type)
            .map(|breaker| breaker.status())
            .unwrap_or(BreakerStatus::Closed)
    }

    pub fn reset(&self, adapter_type: &str) {
        if let Some(breaker) = self.get(adapter_type) {
            breaker.reset();
        }
    }

    pub fn installed(&self) -> Vec<String> {
        let mut types: Vec<String> = self.breakers.read().keys().cloned().collect();
        types.sort();
        types
    }
}
