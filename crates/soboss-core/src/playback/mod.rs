// # Speaker Directory
//
// In-memory implementation of PlaybackRegistry.
//
// ## Purpose
//
// The discovery backend finds endpoints on the network and registers them
// here under the identifier the configuration assigns to their serial
// number. Command processors resolve target and source speakers against it.
//
// ## Replacement
//
// Re-discovering a speaker replaces the endpoint registered under its
// identifier. Processors built before the replacement keep the endpoint they
// resolved at construction.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::SonosConfig;
use crate::traits::{PlaybackEndpoint, PlaybackRegistry};

/// In-memory speaker registry
///
/// # Example
///
/// ```rust,ignore
/// use soboss_core::SpeakerDirectory;
///
/// let directory = SpeakerDirectory::new();
/// directory.insert(Arc::new(kitchen_endpoint));
/// assert!(directory.get("kitchen").is_some());
/// ```
#[derive(Default, Clone)]
pub struct SpeakerDirectory {
    inner: Arc<RwLock<HashMap<String, Arc<dyn PlaybackEndpoint>>>>,
}

impl SpeakerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under its own identifier
    ///
    /// Returns the endpoint previously registered under that identifier.
    pub fn insert(&self, endpoint: Arc<dyn PlaybackEndpoint>) -> Option<Arc<dyn PlaybackEndpoint>> {
        let identifier = endpoint.identifier().to_string();
        self.inner.write().insert(identifier, endpoint)
    }

    /// Register a discovered endpoint if its serial number is configured
    ///
    /// `make_endpoint` receives the configured identifier. Returns the
    /// identifier, or `None` for speakers the configuration does not use.
    pub fn register_discovered<F>(
        &self,
        sonos: &SonosConfig,
        serial: &str,
        make_endpoint: F,
    ) -> Option<String>
    where
        F: FnOnce(&str) -> Arc<dyn PlaybackEndpoint>,
    {
        let Some(identifier) = sonos.identifier_for_serial(serial) else {
            info!("Found unused speaker (serial number {})", serial);
            return None;
        };

        let endpoint = make_endpoint(identifier);
        let previous = self
            .inner
            .write()
            .insert(identifier.to_string(), endpoint);

        info!(
            "Discovered {} speaker {} (serial number {})",
            if previous.is_some() { "existing" } else { "new" },
            identifier,
            serial
        );
        Some(identifier.to_string())
    }

    /// Remove an endpoint
    pub fn remove(&self, identifier: &str) -> Option<Arc<dyn PlaybackEndpoint>> {
        self.inner.write().remove(identifier)
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.inner.read().keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl PlaybackRegistry for SpeakerDirectory {
    fn get(&self, identifier: &str) -> Option<Arc<dyn PlaybackEndpoint>> {
        self.inner.read().get(identifier).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpeakerConfig;
    use crate::error::Result;
    use async_trait::async_trait;

    struct NamedEndpoint(String);

    #[async_trait]
    impl PlaybackEndpoint for NamedEndpoint {
        fn identifier(&self) -> &str {
            &self.0
        }
        fn room_name(&self) -> Option<String> {
            Some(format!("{} room", self.0))
        }
        async fn get_volume(&self) -> Result<u8> {
            Ok(0)
        }
        async fn set_volume(&self, _volume: u8, _channel: &str) -> Result<()> {
            Ok(())
        }
        async fn play(&self) -> Result<bool> {
            Ok(true)
        }
        async fn pause(&self) -> Result<bool> {
            Ok(true)
        }
        async fn play_spdif(&self) -> Result<bool> {
            Ok(true)
        }
        async fn join_group(&self, _peer_room_name: &str) -> Result<bool> {
            Ok(true)
        }
        async fn leave_group(&self) -> Result<()> {
            Ok(())
        }
    }

    fn sonos_config() -> SonosConfig {
        let mut sonos = SonosConfig::default();
        sonos.speakers.insert(
            "SERIAL-1".to_string(),
            SpeakerConfig {
                identifier: Some("kitchen".to_string()),
            },
        );
        sonos
    }

    #[test]
    fn test_insert_and_get() {
        let directory = SpeakerDirectory::new();
        assert!(directory.is_empty());

        directory.insert(Arc::new(NamedEndpoint("kitchen".to_string())));

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("kitchen").unwrap().identifier(), "kitchen");
        assert!(directory.get("bedroom").is_none());
    }

    #[test]
    fn test_register_discovered_uses_configured_identifier() {
        let directory = SpeakerDirectory::new();
        let sonos = sonos_config();

        let identifier = directory.register_discovered(&sonos, "SERIAL-1", |identifier| {
            Arc::new(NamedEndpoint(identifier.to_string()))
        });

        assert_eq!(identifier.as_deref(), Some("kitchen"));
        assert_eq!(directory.identifiers(), ["kitchen"]);
    }

    #[test]
    fn test_register_discovered_ignores_unconfigured_serial() {
        let directory = SpeakerDirectory::new();
        let sonos = sonos_config();

        let identifier = directory.register_discovered(&sonos, "SERIAL-9", |identifier| {
            Arc::new(NamedEndpoint(identifier.to_string()))
        });

        assert!(identifier.is_none());
        assert!(directory.is_empty());
    }
}
