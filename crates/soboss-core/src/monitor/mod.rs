//! Availability monitor
//!
//! Owns the poll cadence of one device and classifies it as online or
//! offline. Only transitions between two known states are published; the
//! first completed probe merely establishes the baseline.
//!
//! ## State Machine
//!
//! ```text
//!            first probe (silent)
//!  Unknown ─────────────────────────┬──────────────┐
//!                                   ▼              ▼
//!                                Online ◄──────► Offline
//!                                  availabilityChange published
//! ```
//!
//! ## Cadence
//!
//! `next_check_at` advances to `now + poll_interval` before the probe is
//! issued, so a slow probe never causes two probes back to back.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PingConfig;
use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventBus};
use crate::traits::ReachabilityProbe;

/// Classification of a monitored device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Availability {
    /// No probe has completed yet
    #[default]
    Unknown,
    /// Last probe succeeded
    Online,
    /// Last probe failed or the host did not answer
    Offline,
}

impl Availability {
    fn from_alive(alive: bool) -> Self {
        if alive { Self::Online } else { Self::Offline }
    }

    /// `Some(true)` when online, `Some(false)` when offline
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Online => Some(true),
            Self::Offline => Some(false),
        }
    }
}

/// Poll cadence and probe timeout of one monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
}

impl From<&PingConfig> for MonitorSettings {
    fn from(config: &PingConfig) -> Self {
        Self {
            poll_interval: config.default_interval(),
            probe_timeout: config.timeout(),
        }
    }
}

/// Per-device reachability monitor
pub struct AvailabilityMonitor {
    device: String,
    poll_interval: Duration,
    probe_timeout: Duration,
    next_check_at: Option<Instant>,
    last_known: Availability,
    probe: Arc<dyn ReachabilityProbe>,
    bus: Arc<EventBus>,
}

impl AvailabilityMonitor {
    /// Create a monitor for `device`
    ///
    /// The first `tick` probes immediately.
    pub fn new(
        device: impl Into<String>,
        settings: MonitorSettings,
        probe: Arc<dyn ReachabilityProbe>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            device: device.into(),
            poll_interval: settings.poll_interval,
            probe_timeout: settings.probe_timeout,
            next_check_at: None,
            last_known: Availability::Unknown,
            probe,
            bus,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Change the cadence; takes effect after the next completed check
    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn set_probe_timeout(&mut self, probe_timeout: Duration) {
        self.probe_timeout = probe_timeout;
    }

    /// When the next probe is due, `None` before the first check
    pub fn next_check_at(&self) -> Option<Instant> {
        self.next_check_at
    }

    pub fn last_known(&self) -> Availability {
        self.last_known
    }

    /// Probe the device if a check is due
    ///
    /// Returns `Some(available)` when a transition was published.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when a check is due but the device
    /// has no host address. The cadence still advances.
    pub async fn tick(&mut self, now: Instant, host: Option<&str>) -> Result<Option<bool>> {
        if self.next_check_at.is_some_and(|next| now < next) {
            return Ok(None);
        }
        self.next_check_at = Some(now + self.poll_interval);

        let host = host
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::config(format!("Device {} has no host address", self.device)))?;

        let current = Availability::from_alive(self.check(host).await);
        let previous = std::mem::replace(&mut self.last_known, current);

        if previous == current {
            debug!("Ping state of '{}': {:?}", self.device, current);
            return Ok(None);
        }

        if previous == Availability::Unknown {
            debug!("Initial ping state of '{}': {:?}", self.device, current);
            return Ok(None);
        }

        debug!("Ping state of '{}' changed: {:?} -> {:?}", self.device, previous, current);

        let available = current == Availability::Online;
        self.bus
            .publish(DomainEvent::availability_changed(&self.device, available))
            .await;

        Ok(Some(available))
    }

    async fn check(&self, host: &str) -> bool {
        match self.probe.probe(host, self.probe_timeout).await {
            Ok(alive) => alive,
            Err(e) => {
                warn!(
                    "{} probe of '{}' ({}) failed: {}",
                    self.probe.probe_name(),
                    self.device,
                    host,
                    e
                );
                false
            }
        }
    }
}
