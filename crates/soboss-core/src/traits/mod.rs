//! Core traits for the SoBoss system
//!
//! This module defines the interfaces of the external collaborators.
//!
//! - [`ReachabilityProbe`]: One reachability test against a host address
//! - [`PlaybackEndpoint`]: Controllable audio endpoint (volume, transport, grouping)
//! - [`PlaybackRegistry`]: Resolves speaker identifiers to endpoints
//! - [`ConfigSource`]: Supplies configuration snapshots

pub mod config_source;
pub mod playback;
pub mod probe;

pub use config_source::ConfigSource;
pub use playback::{PlaybackEndpoint, PlaybackRegistry, MASTER_CHANNEL};
pub use probe::ReachabilityProbe;
