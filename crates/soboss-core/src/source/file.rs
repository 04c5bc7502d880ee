// # File Config Source
//
// Layered JSON implementation of ConfigSource.
//
// ## Layout
//
// Every configuration section lives in its own file inside one directory.
// For a section `ping` and environment `production` the layers are, in
// merge order:
//
// ```text
// ping.json                      required
// ping.private.json              optional, kept out of version control
// ping.production.json           optional
// ping.production.private.json   optional
// ```
//
// Each layer is deep-merged over the previous one: objects merge key by
// key, arrays and scalars replace.
//
// ## Reloads
//
// Files are re-read on every snapshot, so a reload observes edits made
// while the daemon runs.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::Error;
use crate::config::SobossConfig;
use crate::traits::ConfigSource;

/// Sections read by every snapshot and whether their base file must exist
const SECTIONS: &[(&str, bool)] = &[
    ("ping", true),
    ("sonos", true),
    ("genericDevices", true),
    ("scheduler", false),
];

/// Directory-backed config source
///
/// # Example
///
/// ```rust,no_run
/// use soboss_core::FileConfigSource;
///
/// let source = FileConfigSource::new("./config").with_environment("development");
/// ```
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    dir: PathBuf,
    environment: Option<String>,
}

impl FileConfigSource {
    /// Create a source reading base and private layers from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            environment: None,
        }
    }

    /// Also read the `<section>.<environment>` layers
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        let environment = environment.into();
        self.environment = (!environment.is_empty()).then_some(environment);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Merged value of one section, `None` if no layer exists
    pub async fn load_section(&self, section: &str, required: bool) -> Result<Option<Value>, Error> {
        let base = self.dir.join(format!("{}.json", section));
        let mut merged = match read_json(&base).await? {
            Some(value) => Some(value),
            None if required => {
                return Err(Error::config(format!(
                    "Required config file '{}' is not available",
                    base.display()
                )));
            }
            None => None,
        };

        for layer in self.overlay_paths(section) {
            let Some(overlay) = read_json(&layer).await? else {
                continue;
            };
            debug!("Merging config layer {}", layer.display());
            match merged.as_mut() {
                Some(value) => deep_merge(value, overlay),
                None => merged = Some(overlay),
            }
        }

        Ok(merged)
    }

    fn overlay_paths(&self, section: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.dir.join(format!("{}.private.json", section))];
        if let Some(environment) = &self.environment {
            paths.push(self.dir.join(format!("{}.{}.json", section, environment)));
            paths.push(
                self.dir
                    .join(format!("{}.{}.private.json", section, environment)),
            );
        }
        paths
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn snapshot(&self) -> Result<SobossConfig, Error> {
        let mut root = Map::new();
        for (section, required) in SECTIONS {
            if let Some(value) = self.load_section(section, *required).await? {
                root.insert((*section).to_string(), value);
            }
        }

        serde_json::from_value(Value::Object(root))
            .map_err(|e| Error::config(format!("Invalid configuration in {}: {}", self.dir.display(), e)))
    }
}

async fn read_json(path: &Path) -> Result<Option<Value>, Error> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            Error::config(format!("Failed to parse config file '{}': {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Merge `overlay` into `base`: objects recursively, everything else replaces
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
