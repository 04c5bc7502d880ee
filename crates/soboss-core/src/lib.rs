// # soboss-core
//
// Core library of the SoBoss device-availability automation system.
//
// ## Architecture Overview
//
// This library watches devices on the local network and reacts when they
// come online or go offline by driving speaker endpoints:
// - **ReachabilityProbe**: One reachability test against a host address
// - **AvailabilityMonitor**: Per-device poll cadence and online/offline classification
// - **EventBus**: Injected pub/sub bus carrying availability transitions
// - **ManagedDevice**: A device with its monitor and transition action lists
// - **CommandProcessor**: Executes one action list against playback endpoints
// - **DeviceRegistry**: Loads devices from a ConfigSource and drives the poll loop
//
// ## Flow
//
// ```text
// DeviceRegistry::poll_all ─► ManagedDevice::tick ─► AvailabilityMonitor::tick
//        ─► ReachabilityProbe ─► EventBus::publish ─► CommandProcessor::process
//        ─► PlaybackEndpoint
// ```
//
// ## Design Principles
//
// 1. **Library-First**: The daemon only wires collaborators together
// 2. **Injected Collaborators**: Probe, playback, config and bus are traits or values
//    handed in at construction, no global state
// 3. **Isolation**: A failing probe, endpoint or handler never stops its siblings

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod monitor;
pub mod playback;
pub mod registry;
pub mod source;
pub mod traits;

// Re-export core types for convenience
pub use command::{CommandProcessor, PlayState, VolumeRequest};
pub use config::{ActionListConfig, DeviceConfig, PingConfig, SchedulerConfig, SobossConfig, SonosConfig};
pub use device::{DeviceContext, ManagedDevice, RuntimeSettings, Triggers};
pub use error::{Error, Result};
pub use events::{DomainEvent, EventBus, EventHandler, LogEventHandler, SubscriptionId};
pub use monitor::{Availability, AvailabilityMonitor, MonitorSettings};
pub use playback::SpeakerDirectory;
pub use registry::{DeviceRegistry, PollSummary, ReloadSummary};
pub use source::{FileConfigSource, StaticConfigSource};
pub use traits::{ConfigSource, PlaybackEndpoint, PlaybackRegistry, ReachabilityProbe};
