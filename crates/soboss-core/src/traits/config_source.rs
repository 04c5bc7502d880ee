// # Config Source Trait
//
// Defines the interface of the configuration provider.
//
// ## Implementations
//
// - `StaticConfigSource`: in-memory snapshot, replaceable at runtime
// - `FileConfigSource`: layered JSON files, re-read on every snapshot

use async_trait::async_trait;

use crate::config::SobossConfig;

/// Trait for configuration providers
///
/// The core only ever asks for a complete snapshot; where it comes from,
/// how it is merged and how often it changes is the provider's concern.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Current configuration snapshot
    async fn snapshot(&self) -> Result<SobossConfig, crate::Error>;
}
