//! Device registry and scheduler
//!
//! The registry owns every `ManagedDevice`, keyed by identifier, and drives
//! the two periodic loops of the system:
//!
//! - **Reload**: fetch a configuration snapshot, get-or-create every listed
//!   device and apply its configuration
//! - **Poll**: tick every device concurrently, wait for the whole round, then
//!   sleep for the poll cadence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use soboss_core::{DeviceContext, DeviceRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = Arc::new(DeviceRegistry::new(config_source, context));
//! let cancel = CancellationToken::new();
//!
//! let handle = tokio::spawn({
//!     let registry = Arc::clone(&registry);
//!     let cancel = cancel.clone();
//!     async move { registry.run(cancel).await }
//! });
//!
//! // ... on shutdown
//! cancel.cancel();
//! handle.await??;
//! ```
//!
//! ## Failure Handling
//!
//! A failed reload or a failing device tick is logged; the next pass is
//! scheduled regardless, so one bad cycle never stalls a loop. A tick that
//! panics is reported as `Error::Scheduler` for that device only.

use futures::FutureExt;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::device::{DeviceContext, ManagedDevice};
use crate::error::{Error, Result};
use crate::events::panic_message;
use crate::traits::ConfigSource;

/// Outcome of one reload pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Devices created by this pass
    pub added: usize,
    /// Existing devices whose configuration was re-applied
    pub updated: usize,
    /// Devices dropped because they vanished from the configuration
    pub evicted: usize,
}

/// Outcome of one poll round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Devices ticked
    pub ticked: usize,
    /// Availability transitions published
    pub transitions: usize,
    /// Device ticks that failed
    pub failures: usize,
}

/// Registry of managed devices
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<ManagedDevice>>>,
    source: Arc<dyn ConfigSource>,
    context: DeviceContext,
    scheduler: RwLock<SchedulerConfig>,
}

impl DeviceRegistry {
    /// Create an empty registry
    ///
    /// Devices appear on the first `reload`.
    pub fn new(source: Arc<dyn ConfigSource>, context: DeviceContext) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            source,
            context,
            scheduler: RwLock::new(SchedulerConfig::default()),
        }
    }

    /// Device registered under `identifier`
    pub fn get(&self, identifier: &str) -> Option<Arc<ManagedDevice>> {
        if identifier.is_empty() {
            return None;
        }
        self.devices.read().get(identifier).cloned()
    }

    /// All devices, sorted by identifier
    pub fn devices(&self) -> Vec<Arc<ManagedDevice>> {
        let mut devices: Vec<_> = self.devices.read().values().cloned().collect();
        devices.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        devices
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Scheduler settings from the last successful reload
    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler.read().clone()
    }

    /// (Re)load devices from the configuration source
    ///
    /// # Errors
    ///
    /// Fails when the snapshot cannot be fetched or does not validate; no
    /// device is touched in that case.
    pub async fn reload(&self) -> Result<ReloadSummary> {
        let config = self.source.snapshot().await?;
        config.validate()?;

        {
            let mut settings = self.context.settings.write();
            settings.ping = config.ping.clone();
            settings.volume_ceiling = config.sonos.volume_ceiling();
        }
        *self.scheduler.write() = config.scheduler.clone();

        let mut summary = ReloadSummary::default();

        for device_config in &config.generic_devices {
            let (device, created) = self.get_or_create(&device_config.identifier);
            device.apply_config(device_config).await;

            if created {
                summary.added += 1;
            } else {
                summary.updated += 1;
            }
            info!("Loaded generic device '{}'", device_config.identifier);
        }

        if config.scheduler.evict_removed_devices {
            let listed: HashSet<&str> = config
                .generic_devices
                .iter()
                .map(|device| device.identifier.as_str())
                .collect();

            let evicted: Vec<Arc<ManagedDevice>> = {
                let mut devices = self.devices.write();
                let vanished: Vec<String> = devices
                    .keys()
                    .filter(|identifier| !listed.contains(identifier.as_str()))
                    .cloned()
                    .collect();
                vanished
                    .iter()
                    .filter_map(|identifier| devices.remove(identifier))
                    .collect()
            };

            for device in &evicted {
                device.detach_monitor().await;
                info!("Evicted generic device '{}'", device.identifier());
            }
            summary.evicted = evicted.len();
        }

        Ok(summary)
    }

    /// Tick every device concurrently and wait for the whole round
    pub async fn poll_all(&self, now: Instant) -> PollSummary {
        let devices = self.devices();

        let results = join_all(devices.iter().map(|device| async move {
            let result = AssertUnwindSafe(device.tick(now))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Error::scheduler(format!(
                        "tick panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            (device.identifier(), result)
        }))
        .await;

        let mut summary = PollSummary {
            ticked: results.len(),
            ..PollSummary::default()
        };
        for (identifier, result) in results {
            match result {
                Ok(Some(_)) => summary.transitions += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!("Tick of device '{}' failed: {}", identifier, e);
                    summary.failures += 1;
                }
            }
        }
        summary
    }

    /// Load the configuration, then run the reload and poll loops until
    /// `cancel` fires
    ///
    /// # Errors
    ///
    /// Only the initial reload can fail; later failures are logged.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let summary = self.reload().await?;
        info!(
            "Device registry loaded {} device(s) ({} new)",
            self.len(),
            summary.added
        );

        tokio::join!(self.reload_loop(&cancel), self.poll_loop(&cancel));

        info!("Device registry stopped");
        Ok(())
    }

    async fn reload_loop(&self, cancel: &CancellationToken) {
        let mut period = self.scheduler_config().reload_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.reload().await {
                Ok(summary) => debug!("Reload finished: {:?}", summary),
                Err(e) => error!("Failed to reload generic devices: {}", e),
            }

            let next = self.scheduler_config().reload_interval();
            if next != period {
                debug!("Reload interval changed: {:?} -> {:?}", period, next);
                period = next;
                ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }
    }

    async fn poll_loop(&self, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let summary = self.poll_all(Instant::now()).await;
            if summary.failures > 0 {
                debug!("Poll round finished with failures: {:?}", summary);
            }

            let delay = self.scheduler_config().poll_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn get_or_create(&self, identifier: &str) -> (Arc<ManagedDevice>, bool) {
        if let Some(device) = self.devices.read().get(identifier) {
            return (Arc::clone(device), false);
        }

        let mut devices = self.devices.write();
        if let Some(device) = devices.get(identifier) {
            return (Arc::clone(device), false);
        }
        let device = Arc::new(ManagedDevice::new(identifier, self.context.clone()));
        devices.insert(identifier.to_string(), Arc::clone(&device));
        (device, true)
    }
}
