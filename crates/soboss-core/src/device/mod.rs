//! Managed devices
//!
//! A `ManagedDevice` owns zero or one `AvailabilityMonitor` and the action
//! lists bound to its own availability transitions.
//!
//! ## Locking
//!
//! - `state` (async mutex) serializes `apply_config` and `tick` for one
//!   device; it is held while the monitor probes and publishes
//! - `triggers` (sync rwlock) holds the action lists; the device's bus
//!   subscription reads it while `state` is still held by the tick that
//!   published, so it must never be taken while awaiting
//!
//! ## Event Flow
//!
//! ```text
//! tick ─► monitor.tick ─► bus.publish(availabilityChange)
//!                                │ (device-scoped subscription)
//!                                ▼
//!                        TransitionActions::handle
//!                                │ for each action list, in order
//!                                ▼
//!                        CommandProcessor::process
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::CommandProcessor;
use crate::config::{ActionListConfig, DeviceConfig, PingConfig};
use crate::error::Result;
use crate::events::{DomainEvent, EventBus, EventHandler, SubscriptionId};
use crate::monitor::{Availability, AvailabilityMonitor, MonitorSettings};
use crate::traits::{PlaybackRegistry, ReachabilityProbe};

/// Settings shared by every device, refreshed on each reload
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    /// Probe defaults for newly created monitors
    pub ping: PingConfig,
    /// Hard ceiling for volumes applied by action lists
    pub volume_ceiling: Option<u8>,
}

/// Collaborators injected into every device
#[derive(Clone)]
pub struct DeviceContext {
    pub bus: Arc<EventBus>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub playback: Arc<dyn PlaybackRegistry>,
    pub settings: Arc<RwLock<RuntimeSettings>>,
}

impl DeviceContext {
    /// Create a context with default runtime settings
    pub fn new(
        bus: Arc<EventBus>,
        probe: Arc<dyn ReachabilityProbe>,
        playback: Arc<dyn PlaybackRegistry>,
    ) -> Self {
        Self {
            bus,
            probe,
            playback,
            settings: Arc::new(RwLock::new(RuntimeSettings::default())),
        }
    }
}

/// Action lists of one device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triggers {
    pub on_available: Vec<ActionListConfig>,
    pub on_unavailable: Vec<ActionListConfig>,
}

impl Triggers {
    fn for_transition(&self, available: bool) -> &[ActionListConfig] {
        if available {
            &self.on_available
        } else {
            &self.on_unavailable
        }
    }
}

#[derive(Default)]
struct DeviceState {
    host_address: Option<String>,
    monitor: Option<AvailabilityMonitor>,
}

/// A device whose reachability drives speaker automation
pub struct ManagedDevice {
    identifier: String,
    state: Mutex<DeviceState>,
    triggers: Arc<RwLock<Triggers>>,
    context: DeviceContext,
    subscription: SubscriptionId,
}

impl ManagedDevice {
    /// Create a device and subscribe it to its own availability changes
    ///
    /// The device is inert until `apply_config` enables a check.
    pub fn new(identifier: impl Into<String>, context: DeviceContext) -> Self {
        let identifier = identifier.into();
        let triggers = Arc::new(RwLock::new(Triggers::default()));

        let handler = Arc::new(TransitionActions {
            device: identifier.clone(),
            triggers: Arc::clone(&triggers),
            playback: Arc::clone(&context.playback),
            settings: Arc::clone(&context.settings),
        });
        let subscription = context.bus.subscribe_device(identifier.clone(), handler);

        Self {
            identifier,
            state: Mutex::new(DeviceState::default()),
            triggers,
            context,
            subscription,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub async fn host_address(&self) -> Option<String> {
        self.state.lock().await.host_address.clone()
    }

    /// Whether an availability monitor is attached
    pub async fn has_monitor(&self) -> bool {
        self.state.lock().await.monitor.is_some()
    }

    /// Last classification, `Unknown` when no monitor is attached
    pub async fn availability(&self) -> Availability {
        self.state
            .lock()
            .await
            .monitor
            .as_ref()
            .map(AvailabilityMonitor::last_known)
            .unwrap_or_default()
    }

    /// Cadence of the attached monitor
    pub async fn poll_interval(&self) -> Option<Duration> {
        self.state
            .lock()
            .await
            .monitor
            .as_ref()
            .map(AvailabilityMonitor::poll_interval)
    }

    /// Snapshot of the configured action lists
    pub fn triggers(&self) -> Triggers {
        self.triggers.read().clone()
    }

    /// Apply a device configuration
    ///
    /// Idempotent. Keys absent from `config` keep their current values;
    /// action-list arrays that are present replace the old ones wholesale.
    pub async fn apply_config(&self, config: &DeviceConfig) {
        let ping = self.context.settings.read().ping.clone();

        let mut state = self.state.lock().await;

        if let Some(host_address) = &config.host_address {
            state.host_address = Some(host_address.clone());
        }

        if let Some(enabled) = config.ping_enabled() {
            self.set_ping_check(&mut state, enabled, &ping);
        }

        if let Some(monitor) = state.monitor.as_mut() {
            monitor.set_probe_timeout(ping.timeout());
            if let Some(interval_ms) = config.ping_interval_ms {
                monitor.set_poll_interval(Duration::from_millis(interval_ms));
            }
        }

        {
            let mut triggers = self.triggers.write();
            if let Some(action_lists) = &config.on_available {
                triggers.on_available = action_lists.clone();
            }
            if let Some(action_lists) = &config.on_unavailable {
                triggers.on_unavailable = action_lists.clone();
            }
        }

        debug!(
            "Applied configuration to device '{}' (monitor: {})",
            self.identifier,
            state.monitor.is_some()
        );
    }

    /// Drop the monitor, leaving the device inert
    pub async fn detach_monitor(&self) {
        if self.state.lock().await.monitor.take().is_some() {
            info!("Availability monitor of device '{}' detached", self.identifier);
        }
    }

    /// Run the monitor if one is attached
    ///
    /// Returns `Some(available)` when a transition was published.
    pub async fn tick(&self, now: Instant) -> Result<Option<bool>> {
        let mut guard = self.state.lock().await;
        let DeviceState {
            host_address,
            monitor,
        } = &mut *guard;

        match monitor {
            Some(monitor) => monitor.tick(now, host_address.as_deref()).await,
            None => Ok(None),
        }
    }

    fn set_ping_check(&self, state: &mut DeviceState, enabled: bool, ping: &PingConfig) {
        if !enabled {
            if state.monitor.take().is_some() {
                info!("Availability monitor of device '{}' detached", self.identifier);
            }
            return;
        }

        if state.monitor.is_some() {
            return;
        }

        state.monitor = Some(AvailabilityMonitor::new(
            self.identifier.clone(),
            MonitorSettings::from(ping),
            Arc::clone(&self.context.probe),
            Arc::clone(&self.context.bus),
        ));
        info!("Availability monitor of device '{}' attached", self.identifier);
    }
}

impl Drop for ManagedDevice {
    fn drop(&mut self) {
        self.context.bus.unsubscribe(self.subscription);
    }
}

/// Device-scoped subscriber running the action lists of a transition
struct TransitionActions {
    device: String,
    triggers: Arc<RwLock<Triggers>>,
    playback: Arc<dyn PlaybackRegistry>,
    settings: Arc<RwLock<RuntimeSettings>>,
}

#[async_trait]
impl EventHandler for TransitionActions {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        let DomainEvent::AvailabilityChanged { device, available } = event;
        if *device != self.device {
            return Ok(());
        }

        info!(
            "Device {} became {}",
            self.device,
            if *available { "available" } else { "unavailable" }
        );

        let action_lists = self.triggers.read().for_transition(*available).to_vec();
        if action_lists.is_empty() {
            warn!("No commands to process for device {}", self.device);
            return Ok(());
        }

        let volume_ceiling = self.settings.read().volume_ceiling;

        for (index, action_list) in action_lists.into_iter().enumerate() {
            let processor =
                CommandProcessor::new(action_list, Arc::clone(&self.playback), volume_ceiling);
            if let Err(e) = processor.process().await {
                warn!(
                    "Action list {} of device {} failed: {}",
                    index, self.device, e
                );
            }
        }

        Ok(())
    }
}
