//! Action-list command processor
//!
//! A `CommandProcessor` is built from one action list. Construction resolves
//! the `targetSpeakers` and `sourceSpeakers` identifiers once; `process()`
//! then runs every command key in configuration order.
//!
//! ## Commands
//!
//! | Key           | Value                                            |
//! |---------------|--------------------------------------------------|
//! | `setVolume`   | number (clamped to 0-100), `lowestSource`, `highestSource` |
//! | `playState`   | `play`, `pause`, `playSPDIF`                     |
//! | `joinSpeaker` | identifier of the speaker whose group to join    |
//! | `leaveGroup`  | any value                                        |
//!
//! ## Failure Model
//!
//! - Invalid values and unknown identifiers fail the command before any
//!   endpoint call and stop the rest of the action list
//! - Each endpoint call is isolated: a failing target is logged and its
//!   siblings still receive the command
//! - Unknown command keys are logged and skipped

use futures::future::join_all;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ActionListConfig;
use crate::error::{Error, Result};
use crate::traits::{MASTER_CHANNEL, PlaybackEndpoint, PlaybackRegistry};

/// Reserved key naming the endpoints commands are applied to
pub const TARGET_SPEAKERS: &str = "targetSpeakers";

/// Reserved key naming the endpoints symbolic volumes are read from
pub const SOURCE_SPEAKERS: &str = "sourceSpeakers";

pub const SET_VOLUME: &str = "setVolume";
pub const PLAY_STATE: &str = "playState";
pub const JOIN_SPEAKER: &str = "joinSpeaker";
pub const LEAVE_GROUP: &str = "leaveGroup";

/// Transport state requested by `playState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Play,
    Pause,
    PlaySpdif,
}

impl FromStr for PlayState {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "play" => Ok(Self::Play),
            "pause" => Ok(Self::Pause),
            "playSPDIF" => Ok(Self::PlaySpdif),
            other => Err(Error::invalid_input(format!("Invalid play state: {}", other))),
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::PlaySpdif => "playSPDIF",
        })
    }
}

/// Volume requested by `setVolume`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeRequest {
    /// Literal percentage, clamped when applied
    Level(f64),
    /// Lowest volume among the source speakers
    LowestSource,
    /// Highest volume among the source speakers
    HighestSource,
}

impl VolumeRequest {
    /// Parse a `setVolume` value
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Number(number) => number
                .as_f64()
                .map(Self::Level)
                .ok_or_else(|| Error::invalid_input(format!("Invalid setVolume input: {}", number))),
            Value::String(text) => match text.as_str() {
                "lowestSource" => Ok(Self::LowestSource),
                "highestSource" => Ok(Self::HighestSource),
                other => Err(Error::invalid_input(format!("Unknown setVolume input: {}", other))),
            },
            other => Err(Error::invalid_input(format!("Unknown setVolume input: {}", other))),
        }
    }
}

/// Clamp a percentage to 0-100
pub fn clamp_percent(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}

#[derive(Clone)]
struct ResolvedSpeaker {
    identifier: String,
    endpoint: Arc<dyn PlaybackEndpoint>,
}

/// Executes one action list against playback endpoints
pub struct CommandProcessor {
    action_list: ActionListConfig,
    targets: Vec<ResolvedSpeaker>,
    sources: Vec<ResolvedSpeaker>,
    playback: Arc<dyn PlaybackRegistry>,
    volume_ceiling: Option<u8>,
}

impl CommandProcessor {
    /// Build a processor, resolving its target and source speakers
    ///
    /// Identifiers that do not resolve are logged and skipped.
    pub fn new(
        action_list: ActionListConfig,
        playback: Arc<dyn PlaybackRegistry>,
        volume_ceiling: Option<u8>,
    ) -> Self {
        let targets = resolve_speakers(&action_list, TARGET_SPEAKERS, playback.as_ref());
        let sources = resolve_speakers(&action_list, SOURCE_SPEAKERS, playback.as_ref());

        Self {
            action_list,
            targets,
            sources,
            playback,
            volume_ceiling,
        }
    }

    /// Resolved target identifiers, in configuration order
    pub fn target_identifiers(&self) -> Vec<&str> {
        self.targets.iter().map(|s| s.identifier.as_str()).collect()
    }

    /// Resolved source identifiers, in configuration order
    pub fn source_identifiers(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.identifier.as_str()).collect()
    }

    /// Run every command of the action list in order
    ///
    /// Stops at the first command that fails.
    pub async fn process(&self) -> Result<()> {
        for (action, value) in self.action_list.entries() {
            match action {
                TARGET_SPEAKERS | SOURCE_SPEAKERS => continue,
                SET_VOLUME => {
                    self.set_volume(value).await?;
                }
                PLAY_STATE => self.set_play_state(value).await?,
                JOIN_SPEAKER => self.join_speaker(value).await?,
                LEAVE_GROUP => self.leave_group().await?,
                other => warn!("Command processor has unknown command: {}", other),
            }
        }
        Ok(())
    }

    /// Apply a volume to every target
    ///
    /// Returns the volume sent to the targets, after the ceiling.
    pub async fn set_volume(&self, value: &Value) -> Result<u8> {
        let requested = match VolumeRequest::parse(value)? {
            VolumeRequest::Level(level) => clamp_percent(level),
            request => self.source_volume(request).await?,
        };

        let volume = match self.volume_ceiling {
            Some(ceiling) if requested > ceiling => {
                info!("Capping requested volume {}% to maximum {}%", requested, ceiling);
                ceiling
            }
            _ => requested,
        };

        let results = self
            .fan_out(move |endpoint| async move {
                endpoint.set_volume(volume, MASTER_CHANNEL).await
            })
            .await;
        report_failures(SET_VOLUME, results);

        info!(
            "Set volume of target speaker(s) {} to {}%",
            self.target_names(),
            volume
        );
        Ok(volume)
    }

    /// Apply a transport state to every target
    pub async fn set_play_state(&self, value: &Value) -> Result<()> {
        let state: PlayState = value
            .as_str()
            .ok_or_else(|| Error::invalid_input(format!("Invalid play state: {}", value)))?
            .parse()?;

        let results = self
            .fan_out(move |endpoint| async move {
                match state {
                    PlayState::Play => endpoint.play().await,
                    PlayState::Pause => endpoint.pause().await,
                    PlayState::PlaySpdif => endpoint.play_spdif().await,
                }
            })
            .await;
        report_rejections(PLAY_STATE, results);

        info!(
            "Set play state of target speaker(s) {} to {}",
            self.target_names(),
            state
        );
        Ok(())
    }

    /// Make every target join the group of the named speaker
    ///
    /// # Errors
    ///
    /// Fails before any `join_group` call when the speaker is unknown or has
    /// no room name.
    pub async fn join_speaker(&self, value: &Value) -> Result<()> {
        let name = value
            .as_str()
            .ok_or_else(|| Error::invalid_input(format!("Invalid joinSpeaker input: {}", value)))?;

        let peer = self
            .playback
            .get(name)
            .ok_or_else(|| Error::not_found(format!("Unable to find speaker '{}'", name)))?;

        let room = peer
            .room_name()
            .filter(|room| !room.is_empty())
            .ok_or_else(|| Error::config(format!("Speaker '{}' has no room name", name)))?;

        let results = self
            .fan_out(|endpoint| {
                let room = room.clone();
                async move { endpoint.join_group(&room).await }
            })
            .await;
        report_rejections(JOIN_SPEAKER, results);

        info!(
            "Target speaker(s) {} joined group {}",
            self.target_names(),
            name
        );
        Ok(())
    }

    /// Make every target leave its current group
    pub async fn leave_group(&self) -> Result<()> {
        let results = self
            .fan_out(|endpoint| async move { endpoint.leave_group().await })
            .await;
        report_failures(LEAVE_GROUP, results);

        info!(
            "Target speaker(s) {} left their current group",
            self.target_names()
        );
        Ok(())
    }

    async fn source_volume(&self, request: VolumeRequest) -> Result<u8> {
        if self.sources.is_empty() {
            return Err(Error::config("setVolume requires source speakers"));
        }

        let readings = join_all(self.sources.iter().map(|speaker| async move {
            (speaker.identifier.as_str(), speaker.endpoint.get_volume().await)
        }))
        .await;

        let mut levels = Vec::with_capacity(readings.len());
        for (identifier, reading) in readings {
            match reading {
                Ok(level) => levels.push(level.min(100)),
                Err(e) => warn!("Failed to read volume of source speaker {}: {}", identifier, e),
            }
        }

        let (label, aggregate) = match request {
            VolumeRequest::HighestSource => ("highest", levels.iter().max()),
            _ => ("lowest", levels.iter().min()),
        };
        let aggregate = aggregate.copied().ok_or_else(|| {
            Error::device(self.source_names(), "no source speaker reported its volume")
        })?;

        info!(
            "Source speaker(s) {} {} volume is {}%",
            self.source_names(),
            label,
            aggregate
        );
        Ok(aggregate)
    }

    /// Run `operation` against every target concurrently and wait for all
    async fn fan_out<F, Fut, T>(&self, operation: F) -> Vec<(String, Result<T>)>
    where
        F: Fn(Arc<dyn PlaybackEndpoint>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let calls = self.targets.iter().map(|speaker| {
            let call = operation(Arc::clone(&speaker.endpoint));
            let identifier = speaker.identifier.clone();
            async move { (identifier, call.await) }
        });
        join_all(calls).await
    }

    fn target_names(&self) -> String {
        self.target_identifiers().join(", ")
    }

    fn source_names(&self) -> String {
        self.source_identifiers().join(", ")
    }
}

fn resolve_speakers(
    action_list: &ActionListConfig,
    key: &str,
    playback: &dyn PlaybackRegistry,
) -> Vec<ResolvedSpeaker> {
    let Some(Value::Array(entries)) = action_list.get(key) else {
        return Vec::new();
    };

    let mut resolved: Vec<ResolvedSpeaker> = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(identifier) = entry.as_str() else {
            warn!("Command processor ignores non-string {} entry: {}", key, entry);
            continue;
        };
        if resolved.iter().any(|speaker| speaker.identifier == identifier) {
            continue;
        }
        match playback.get(identifier) {
            Some(endpoint) => resolved.push(ResolvedSpeaker {
                identifier: identifier.to_string(),
                endpoint,
            }),
            None => warn!(
                "Command processor includes not available {} speaker: {}",
                role_of(key),
                identifier
            ),
        }
    }
    resolved
}

fn role_of(key: &str) -> &'static str {
    if key == SOURCE_SPEAKERS { "source" } else { "target" }
}

fn report_failures<T>(command: &str, results: Vec<(String, Result<T>)>) {
    for (identifier, result) in results {
        if let Err(e) = result {
            warn!("{} failed on speaker {}: {}", command, identifier, e);
        }
    }
}

fn report_rejections(command: &str, results: Vec<(String, Result<bool>)>) {
    for (identifier, result) in results {
        match result {
            Ok(true) => debug!("{} accepted by speaker {}", command, identifier),
            Ok(false) => warn!("{} was not accepted by speaker {}", command, identifier),
            Err(e) => warn!("{} failed on speaker {}: {}", command, identifier, e),
        }
    }
}
