//! Configuration types for the SoBoss system
//!
//! This module defines all configuration structures used throughout the crate.
//! The JSON layout uses camelCase keys:
//!
//! ```json
//! {
//!   "ping": { "defaultInterval": 5000, "timeOutMs": 2000 },
//!   "sonos": { "maxSetVolume": 60, "speakers": { "RINCON-SERIAL": { "identifier": "kitchen" } } },
//!   "genericDevices": [
//!     {
//!       "identifier": "tv",
//!       "hostAddress": "192.168.1.20",
//!       "checks": ["ping"],
//!       "onAvailable": [
//!         { "targetSpeakers": ["kitchen"], "joinSpeaker": "living", "setVolume": 30 }
//!       ]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Minimum probe timeout accepted by the configuration
pub const MIN_PROBE_TIMEOUT_MS: u64 = 1000;

/// Capability name that enables the availability monitor on a device
pub const PING_CHECK: &str = "ping";

/// Main SoBoss configuration snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SobossConfig {
    /// Reachability probe settings
    #[serde(default)]
    pub ping: PingConfig,

    /// Playback settings
    #[serde(default)]
    pub sonos: SonosConfig,

    /// Managed devices
    #[serde(default)]
    pub generic_devices: Vec<DeviceConfig>,

    /// Poll and reload cadence
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl SobossConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.ping.validate()?;
        self.scheduler.validate()?;

        let mut seen = HashSet::new();
        for device in &self.generic_devices {
            device.validate()?;
            if !seen.insert(device.identifier.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate device identifier: {}",
                    device.identifier
                )));
            }
        }

        Ok(())
    }
}

/// Reachability probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingConfig {
    /// Poll interval for devices without `pingIntervalMs` (milliseconds)
    #[serde(rename = "defaultInterval", default = "default_ping_interval_ms")]
    pub default_interval_ms: u64,

    /// Probe timeout (milliseconds)
    #[serde(rename = "timeOutMs", default = "default_ping_timeout_ms")]
    pub time_out_ms: u64,
}

impl PingConfig {
    /// Validate the probe settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.default_interval_ms == 0 {
            return Err(crate::Error::config("ping.defaultInterval must be > 0"));
        }
        if self.time_out_ms < MIN_PROBE_TIMEOUT_MS {
            return Err(crate::Error::config(format!(
                "ping.timeOutMs must be at least {}ms, got {}ms",
                MIN_PROBE_TIMEOUT_MS, self.time_out_ms
            )));
        }
        Ok(())
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.time_out_ms)
    }
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_ping_interval_ms(),
            time_out_ms: default_ping_timeout_ms(),
        }
    }
}

fn default_ping_interval_ms() -> u64 {
    5000
}

fn default_ping_timeout_ms() -> u64 {
    2000
}

/// Playback configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonosConfig {
    /// Hard ceiling for any volume applied by an action list
    ///
    /// Values that are not JSON numbers are ignored.
    #[serde(default, deserialize_with = "numeric_or_none")]
    pub max_set_volume: Option<f64>,

    /// Discovered speakers by serial number
    #[serde(default)]
    pub speakers: HashMap<String, SpeakerConfig>,
}

impl SonosConfig {
    /// Configured identifier for a discovered serial number
    pub fn identifier_for_serial(&self, serial: &str) -> Option<&str> {
        self.speakers
            .get(serial)
            .and_then(|speaker| speaker.identifier.as_deref())
            .filter(|identifier| !identifier.is_empty())
    }

    /// Volume ceiling as a percentage, if configured
    pub fn volume_ceiling(&self) -> Option<u8> {
        self.max_set_volume
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(0.0, 100.0).round() as u8)
    }
}

fn numeric_or_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(serde_json::Value::as_f64))
}

/// Speaker mapping entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakerConfig {
    /// Identifier used by action lists
    #[serde(default)]
    pub identifier: Option<String>,
}

/// Managed device configuration
///
/// Optional fields that are absent leave the device's current value in place
/// when the configuration is re-applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Unique device identifier
    pub identifier: String,

    /// Address handed to the reachability probe
    #[serde(default)]
    pub host_address: Option<String>,

    /// Enabled capabilities (`"ping"` enables the availability monitor)
    #[serde(default)]
    pub checks: Option<Vec<String>>,

    /// Per-device poll interval (milliseconds)
    #[serde(default)]
    pub ping_interval_ms: Option<u64>,

    /// Action lists run when the device becomes available
    #[serde(default)]
    pub on_available: Option<Vec<ActionListConfig>>,

    /// Action lists run when the device becomes unavailable
    #[serde(default)]
    pub on_unavailable: Option<Vec<ActionListConfig>>,
}

impl DeviceConfig {
    /// Create a new device configuration
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            host_address: None,
            checks: None,
            ping_interval_ms: None,
            on_available: None,
            on_unavailable: None,
        }
    }

    /// Set the host address
    pub fn with_host_address(mut self, host_address: impl Into<String>) -> Self {
        self.host_address = Some(host_address.into());
        self
    }

    /// Set the enabled capabilities
    pub fn with_checks<I, S>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checks = Some(checks.into_iter().map(Into::into).collect());
        self
    }

    /// Set the per-device poll interval
    pub fn with_ping_interval_ms(mut self, interval_ms: u64) -> Self {
        self.ping_interval_ms = Some(interval_ms);
        self
    }

    /// Set the action lists for the available transition
    pub fn with_on_available(mut self, action_lists: Vec<ActionListConfig>) -> Self {
        self.on_available = Some(action_lists);
        self
    }

    /// Set the action lists for the unavailable transition
    pub fn with_on_unavailable(mut self, action_lists: Vec<ActionListConfig>) -> Self {
        self.on_unavailable = Some(action_lists);
        self
    }

    /// Whether the ping capability is listed, `None` when `checks` is absent
    pub fn ping_enabled(&self) -> Option<bool> {
        self.checks
            .as_ref()
            .map(|checks| checks.iter().any(|check| check == PING_CHECK))
    }

    /// Validate the device configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.identifier.trim().is_empty() {
            return Err(crate::Error::config("Device identifier cannot be empty"));
        }
        if self.ping_interval_ms == Some(0) {
            return Err(crate::Error::config(format!(
                "Device {} pingIntervalMs must be > 0",
                self.identifier
            )));
        }
        Ok(())
    }
}

/// One declarative action list
///
/// Reserved keys `targetSpeakers` and `sourceSpeakers` name endpoints; every
/// other key is a command executed in the order it appears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionListConfig(serde_json::Map<String, serde_json::Value>);

impl ActionListConfig {
    /// Empty action list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key, keeping insertion order
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Raw entries in configuration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ActionListConfig {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Delay between the end of one poll round and the start of the next
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay between configuration reloads
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,

    /// Drop devices that disappear from the configuration on reload
    ///
    /// Off by default: a vanished device keeps its last applied configuration.
    #[serde(default)]
    pub evict_removed_devices: bool,
}

impl SchedulerConfig {
    /// Validate the scheduler settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::config("scheduler.pollIntervalMs must be > 0"));
        }
        if self.reload_interval_secs == 0 {
            return Err(crate::Error::config(
                "scheduler.reloadIntervalSecs must be > 0",
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reload_interval_secs: default_reload_interval_secs(),
            evict_removed_devices: false,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_reload_interval_secs() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_camel_case_config() {
        let config: SobossConfig = serde_json::from_value(json!({
            "ping": { "defaultInterval": 3000, "timeOutMs": 1500 },
            "sonos": { "maxSetVolume": 60, "speakers": { "S1": { "identifier": "kitchen" } } },
            "genericDevices": [
                {
                    "identifier": "tv",
                    "hostAddress": "192.168.1.20",
                    "checks": ["ping"],
                    "pingIntervalMs": 1000,
                    "onAvailable": [{ "targetSpeakers": ["kitchen"], "setVolume": 20 }]
                }
            ]
        }))
        .unwrap();

        assert_eq!(config.ping.default_interval_ms, 3000);
        assert_eq!(config.ping.time_out_ms, 1500);
        assert_eq!(config.sonos.volume_ceiling(), Some(60));
        assert_eq!(config.sonos.identifier_for_serial("S1"), Some("kitchen"));

        let device = &config.generic_devices[0];
        assert_eq!(device.host_address.as_deref(), Some("192.168.1.20"));
        assert_eq!(device.ping_enabled(), Some(true));
        assert_eq!(device.ping_interval_ms, Some(1000));
        assert!(device.on_unavailable.is_none());
        assert_eq!(device.on_available.as_ref().unwrap().len(), 1);

        assert_eq!(config.scheduler.poll_interval_ms, 500);
        assert_eq!(config.scheduler.reload_interval_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_action_list_preserves_key_order() {
        let action: ActionListConfig = serde_json::from_str(
            r#"{"targetSpeakers":["a"],"playState":"pause","leaveGroup":true,"setVolume":10}"#,
        )
        .unwrap();

        let keys: Vec<&str> = action.entries().map(|(key, _)| key).collect();
        assert_eq!(keys, ["targetSpeakers", "playState", "leaveGroup", "setVolume"]);
    }

    #[test]
    fn test_validate_rejects_short_timeout() {
        let mut config = SobossConfig::default();
        config.ping.time_out_ms = 500;
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_validate_rejects_duplicate_identifiers() {
        let config = SobossConfig {
            generic_devices: vec![DeviceConfig::new("tv"), DeviceConfig::new("tv")],
            ..SobossConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ping_enabled_absent_checks() {
        let device = DeviceConfig::new("tv");
        assert_eq!(device.ping_enabled(), None);

        let device = device.with_checks(["arp"]);
        assert_eq!(device.ping_enabled(), Some(false));
    }

    #[test]
    fn test_non_numeric_max_set_volume_is_ignored() {
        for value in [json!("60"), json!(true), json!({ "level": 60 })] {
            let sonos: SonosConfig =
                serde_json::from_value(json!({ "maxSetVolume": value })).unwrap();
            assert_eq!(sonos.max_set_volume, None);
            assert_eq!(sonos.volume_ceiling(), None);
        }

        let sonos: SonosConfig = serde_json::from_value(json!({ "maxSetVolume": null })).unwrap();
        assert_eq!(sonos.volume_ceiling(), None);
    }

    #[test]
    fn test_volume_ceiling_ignores_non_finite() {
        let sonos = SonosConfig {
            max_set_volume: Some(f64::NAN),
            ..SonosConfig::default()
        };
        assert_eq!(sonos.volume_ceiling(), None);

        let sonos = SonosConfig {
            max_set_volume: Some(140.0),
            ..SonosConfig::default()
        };
        assert_eq!(sonos.volume_ceiling(), Some(100));
    }
}
