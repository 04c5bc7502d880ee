//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call they receive so tests can assert on what
//! the core did, and in which order, without any network access.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use soboss_core::error::{Error, Result};
use soboss_core::traits::{PlaybackEndpoint, ReachabilityProbe};
use soboss_core::{
    ActionListConfig, DeviceConfig, DeviceContext, DomainEvent, EventBus, EventHandler,
    SpeakerDirectory,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

/// Shared, ordered log of calls across several doubles
pub type CallJournal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> CallJournal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Scripted answer of a probe call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReply {
    Alive,
    Dead,
    Fail,
    Panic,
}

/// Probe answering from a per-host script
///
/// The last reply of a script repeats forever; hosts without a script are
/// reported dead.
#[derive(Default)]
pub struct ScriptedProbe {
    scripts: Mutex<HashMap<String, VecDeque<ProbeReply>>>,
    calls: Mutex<Vec<(String, Duration)>>,
    call_count: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the script of `host`
    pub fn script(&self, host: &str, replies: impl IntoIterator<Item = ProbeReply>) {
        self.scripts
            .lock()
            .insert(host.to_string(), replies.into_iter().collect());
    }

    /// Make every probe call take `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Every probe call made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Probe calls made against `host`
    pub fn calls_for(&self, host: &str) -> usize {
        self.calls.lock().iter().filter(|(h, _)| h == host).count()
    }

    /// Timeout passed to the latest call
    pub fn last_timeout(&self) -> Option<Duration> {
        self.calls.lock().last().map(|(_, timeout)| *timeout)
    }

    fn next_reply(&self, host: &str) -> ProbeReply {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(host) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(ProbeReply::Dead),
            Some(queue) => queue.front().copied().unwrap_or(ProbeReply::Dead),
            None => ProbeReply::Dead,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn probe(&self, host: &str, timeout: Duration) -> Result<bool> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push((host.to_string(), timeout));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(host) {
            ProbeReply::Alive => Ok(true),
            ProbeReply::Dead => Ok(false),
            ProbeReply::Fail => Err(Error::probe(format!("scripted failure for {}", host))),
            ProbeReply::Panic => panic!("scripted panic for {}", host),
        }
    }

    fn probe_name(&self) -> &'static str {
        "scripted"
    }
}

/// Playback endpoint that records every call
pub struct RecordingEndpoint {
    identifier: String,
    room_name: Option<String>,
    volume: AtomicU8,
    fail_set_volume: AtomicBool,
    fail_get_volume: AtomicBool,
    accept_join: AtomicBool,
    calls: Mutex<Vec<String>>,
    journal: Option<CallJournal>,
    delay: Option<Duration>,
}

impl RecordingEndpoint {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            room_name: Some(format!("{} room", identifier)),
            volume: AtomicU8::new(0),
            fail_set_volume: AtomicBool::new(false),
            fail_get_volume: AtomicBool::new(false),
            accept_join: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
            journal: None,
            delay: None,
        }
    }

    pub fn with_volume(self, volume: u8) -> Self {
        self.volume.store(volume, Ordering::SeqCst);
        self
    }

    pub fn without_room_name(mut self) -> Self {
        self.room_name = None;
        self
    }

    pub fn failing_set_volume(self) -> Self {
        self.fail_set_volume.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_get_volume(self) -> Self {
        self.fail_get_volume.store(true, Ordering::SeqCst);
        self
    }

    /// Make every call take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn rejecting_join(self) -> Self {
        self.accept_join.store(false, Ordering::SeqCst);
        self
    }

    /// Also append `<identifier>.<call>` to a shared journal
    pub fn sharing_journal(mut self, journal: &CallJournal) -> Self {
        self.journal = Some(Arc::clone(journal));
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Calls whose name starts with `prefix`
    pub fn calls_named(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::SeqCst)
    }

    async fn record(&self, call: String) {
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("{}.{}", self.identifier, call));
        }
        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PlaybackEndpoint for RecordingEndpoint {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn room_name(&self) -> Option<String> {
        self.room_name.clone()
    }

    async fn get_volume(&self) -> Result<u8> {
        self.record("getVolume".to_string()).await;
        if self.fail_get_volume.load(Ordering::SeqCst) {
            return Err(Error::device(&self.identifier, "volume unavailable"));
        }
        Ok(self.volume())
    }

    async fn set_volume(&self, volume: u8, channel: &str) -> Result<()> {
        self.record(format!("setVolume:{}:{}", volume, channel)).await;
        if self.fail_set_volume.load(Ordering::SeqCst) {
            return Err(Error::device(&self.identifier, "connection refused"));
        }
        self.volume.store(volume, Ordering::SeqCst);
        Ok(())
    }

    async fn play(&self) -> Result<bool> {
        self.record("play".to_string()).await;
        Ok(true)
    }

    async fn pause(&self) -> Result<bool> {
        self.record("pause".to_string()).await;
        Ok(true)
    }

    async fn play_spdif(&self) -> Result<bool> {
        self.record("playSPDIF".to_string()).await;
        Ok(true)
    }

    async fn join_group(&self, peer_room_name: &str) -> Result<bool> {
        self.record(format!("joinGroup:{}", peer_room_name)).await;
        Ok(self.accept_join.load(Ordering::SeqCst))
    }

    async fn leave_group(&self) -> Result<()> {
        self.record("leaveGroup".to_string()).await;
        Ok(())
    }
}

/// Event handler that records the events it receives
#[derive(Default)]
pub struct RecordingHandler {
    name: String,
    events: Mutex<Vec<DomainEvent>>,
    fail: bool,
    journal: Option<CallJournal>,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Record the event, then report an error
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn sharing_journal(mut self, journal: &CallJournal) -> Self {
        self.journal = Some(Arc::clone(journal));
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        if let Some(journal) = &self.journal {
            journal.lock().push(self.name.clone());
        }
        if self.fail {
            return Err(Error::Other(format!("{} refused the event", self.name)));
        }
        Ok(())
    }
}

/// Event handler that panics on every event
pub struct PanickingHandler {
    calls: AtomicUsize,
}

impl PanickingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for PanickingHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("handler broke on {:?}", event)
    }
}

/// Directory holding the given endpoints
pub fn directory_with(endpoints: &[&Arc<RecordingEndpoint>]) -> SpeakerDirectory {
    let directory = SpeakerDirectory::new();
    for endpoint in endpoints {
        let endpoint: Arc<dyn PlaybackEndpoint> = Arc::clone(*endpoint) as Arc<dyn PlaybackEndpoint>;
        directory.insert(endpoint);
    }
    directory
}

/// Action list from a JSON object literal
pub fn action(value: Value) -> ActionListConfig {
    serde_json::from_value(value).expect("action list literal is an object")
}

/// Context wired to a fresh bus
pub fn context(probe: Arc<ScriptedProbe>, directory: SpeakerDirectory) -> DeviceContext {
    DeviceContext::new(Arc::new(EventBus::new()), probe, Arc::new(directory))
}

/// Device with the ping check enabled
pub fn pinged_device(identifier: &str, host: &str) -> DeviceConfig {
    DeviceConfig::new(identifier)
        .with_host_address(host)
        .with_checks(["ping"])
        .with_ping_interval_ms(1000)
}
