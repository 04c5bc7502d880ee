// # Static Config Source
//
// In-memory implementation of ConfigSource.
//
// ## Purpose
//
// Holds one configuration snapshot that callers may replace at any time.
// The next reload observes the replacement. Useful for embedding the core
// as a library and for tests.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::SobossConfig;
use crate::traits::ConfigSource;

/// In-memory config source
///
/// # Example
///
/// ```rust,no_run
/// use soboss_core::{SobossConfig, StaticConfigSource};
///
/// let source = StaticConfigSource::new(SobossConfig::default());
/// source.replace(SobossConfig::default());
/// ```
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    config: RwLock<SobossConfig>,
}

impl StaticConfigSource {
    pub fn new(config: SobossConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Replace the snapshot served by later calls
    pub fn replace(&self, config: SobossConfig) {
        *self.config.write() = config;
    }

    /// Modify the snapshot in place
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SobossConfig),
    {
        f(&mut self.config.write());
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn snapshot(&self) -> Result<SobossConfig, crate::Error> {
        Ok(self.config.read().clone())
    }
}
