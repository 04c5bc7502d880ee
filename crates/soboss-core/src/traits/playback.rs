// # Playback Endpoint Traits
//
// Defines the capability surface of a controllable speaker and the registry
// that resolves configured speaker identifiers to endpoints.
//
// ## Implementations
//
// - Discovery/wire-protocol backends live outside this crate
// - `SpeakerDirectory` (crate::playback) is the in-memory registry they populate

use async_trait::async_trait;
use std::sync::Arc;

/// Volume channel used for every volume command
pub const MASTER_CHANNEL: &str = "Master";

/// Trait for controllable playback endpoints
///
/// All operations are asynchronous and fallible. Boolean results report
/// whether the endpoint accepted the command.
///
/// # Thread Safety
///
/// Endpoints are shared as `Arc<dyn PlaybackEndpoint>` and called from
/// concurrent fan-outs, so every method must be safe to call concurrently.
#[async_trait]
pub trait PlaybackEndpoint: Send + Sync {
    /// Identifier this endpoint is registered under
    fn identifier(&self) -> &str;

    /// Room name used when other endpoints join this one's group
    fn room_name(&self) -> Option<String>;

    /// Current volume (percentage)
    async fn get_volume(&self) -> Result<u8, crate::Error>;

    /// Set the volume (percentage) on a channel
    async fn set_volume(&self, volume: u8, channel: &str) -> Result<(), crate::Error>;

    /// Start regular playback
    async fn play(&self) -> Result<bool, crate::Error>;

    /// Pause playback
    async fn pause(&self) -> Result<bool, crate::Error>;

    /// Switch to the S/PDIF input and play it
    async fn play_spdif(&self) -> Result<bool, crate::Error>;

    /// Join the group of the endpoint in `peer_room_name`
    async fn join_group(&self, peer_room_name: &str) -> Result<bool, crate::Error>;

    /// Leave the current group
    async fn leave_group(&self) -> Result<(), crate::Error>;
}

/// Resolves speaker identifiers to endpoints
pub trait PlaybackRegistry: Send + Sync {
    /// Endpoint registered under `identifier`, if any
    fn get(&self, identifier: &str) -> Option<Arc<dyn PlaybackEndpoint>>;
}
