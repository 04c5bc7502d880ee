//! In-process event bus
//!
//! The bus decouples availability detection from the reaction to it.
//! One instance is owned by the application root and handed to every
//! component that publishes or subscribes.
//!
//! ## Delivery
//!
//! ```text
//! publish(event)
//!     │
//!     ├── global subscribers ───────┐
//!     ├── subscribers of event.device ──┤ merged by registration order
//!     │                               ▼
//!     │                   handler.handle(&event).await   (one at a time)
//!     │
//!     └── watch() streams (broadcast, lossy for lagging observers)
//! ```
//!
//! Handlers run on the publisher's task, in registration order. A handler
//! error or panic is logged and never reaches the publisher or the handlers
//! after it.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, warn};

use crate::error::Result;

/// Default capacity of the observer broadcast channel
const DEFAULT_WATCH_CAPACITY: usize = 256;

/// Events published on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A monitored device went online or offline
    AvailabilityChanged {
        /// Identifier of the device
        device: String,
        /// New availability
        available: bool,
    },
}

impl DomainEvent {
    /// Create an availability change event
    pub fn availability_changed(device: impl Into<String>, available: bool) -> Self {
        Self::AvailabilityChanged {
            device: device.into(),
            available,
        }
    }

    /// Identifier of the device the event is about
    pub fn device(&self) -> &str {
        match self {
            Self::AvailabilityChanged { device, .. } => device,
        }
    }

    /// Event name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Self::AvailabilityChanged { .. } => "availabilityChange",
        }
    }
}

/// Handle returned by every subscription
///
/// Ids are handed out in increasing order, which is also delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Trait for event subscribers
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event
    ///
    /// Errors are logged by the bus.
    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Subscribers {
    all: Vec<Registration>,
    by_device: HashMap<String, Vec<Registration>>,
}

/// Typed publish/subscribe broker
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<Subscribers>,
    observers: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Create a bus with the default observer capacity
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    /// Create a bus whose `watch()` streams buffer `capacity` events
    pub fn with_watch_capacity(capacity: usize) -> Self {
        let (observers, _) = broadcast::channel(capacity.max(1));
        Self {
            next_id: AtomicU64::new(0),
            subscribers: RwLock::new(Subscribers::default()),
            observers,
        }
    }

    /// Subscribe to every event
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = self.allocate_id();
        self.subscribers.write().all.push(Registration { id, handler });
        id
    }

    /// Subscribe to the events of one device
    pub fn subscribe_device(
        &self,
        device: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.subscribers
            .write()
            .by_device
            .entry(device.into())
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Remove a subscription
    ///
    /// Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut guard = self.subscribers.write();

        let before = guard.all.len();
        guard.all.retain(|registration| registration.id != id);
        if guard.all.len() != before {
            return true;
        }

        let mut removed = false;
        guard.by_device.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|registration| registration.id != id);
            removed |= registrations.len() != before;
            !registrations.is_empty()
        });
        removed
    }

    /// Deliver an event to its subscribers
    ///
    /// Returns the number of handlers invoked.
    pub async fn publish(&self, event: DomainEvent) -> usize {
        let handlers = self.handlers_for(&event);
        debug!(
            "Publishing {} for {} to {} handler(s)",
            event.name(),
            event.device(),
            handlers.len()
        );

        for registration in &handlers {
            let outcome = AssertUnwindSafe(registration.handler.handle(&event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    "Subscriber {:?} failed to handle {} for {}: {}",
                    registration.id,
                    event.name(),
                    event.device(),
                    e
                ),
                Err(panic) => error!(
                    "Subscriber {:?} panicked while handling {} for {}: {}",
                    registration.id,
                    event.name(),
                    event.device(),
                    panic_message(panic.as_ref())
                ),
            }
        }

        // Only fails when nobody is watching
        let _ = self.observers.send(event);

        handlers.len()
    }

    /// Stream of every published event
    ///
    /// Observers that fall behind by more than the channel capacity skip the
    /// events they missed.
    pub fn watch(&self) -> Pin<Box<dyn Stream<Item = DomainEvent> + Send + 'static>> {
        let stream = BroadcastStream::new(self.observers.subscribe())
            .filter_map(|item| item.ok());
        Box::pin(stream)
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        let guard = self.subscribers.read();
        guard.all.len() + guard.by_device.values().map(Vec::len).sum::<usize>()
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn handlers_for(&self, event: &DomainEvent) -> Vec<Registration> {
        let guard = self.subscribers.read();
        let mut handlers = guard.all.clone();
        if let Some(device_handlers) = guard.by_device.get(event.device()) {
            handlers.extend(device_handlers.iter().cloned());
        }
        handlers.sort_by_key(|registration| registration.id);
        handlers
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Subscriber that logs every event at debug level
#[derive(Debug, Default)]
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        match event {
            DomainEvent::AvailabilityChanged { device, available } => {
                debug!("{} {} {}", event.name(), device, available);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Recorder {
        label: &'static str,
        log: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, _event: &DomainEvent) -> Result<()> {
            self.log.lock().push(self.label);
            if self.fail {
                return Err(Error::Other("subscriber failed".to_string()));
            }
            Ok(())
        }
    }

    fn recorder(
        label: &'static str,
        log: &Arc<parking_lot::Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn EventHandler> {
        Arc::new(Recorder {
            label,
            log: Arc::clone(log),
            fail,
        })
    }

    #[tokio::test]
    async fn test_delivery_follows_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        bus.subscribe(recorder("global-1", &log, false));
        bus.subscribe_device("tv", recorder("tv", &log, false));
        bus.subscribe_device("radio", recorder("radio", &log, false));
        bus.subscribe(recorder("global-2", &log, false));

        let invoked = bus
            .publish(DomainEvent::availability_changed("tv", true))
            .await;

        assert_eq!(invoked, 3);
        assert_eq!(*log.lock(), ["global-1", "tv", "global-2"]);
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_stop_siblings() {
        let bus = EventBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        bus.subscribe(recorder("first", &log, true));
        bus.subscribe(recorder("second", &log, false));

        bus.publish(DomainEvent::availability_changed("tv", false))
            .await;

        assert_eq!(*log.lock(), ["first", "second"]);
    }

    struct Panicking;

    #[async_trait]
    impl EventHandler for Panicking {
        async fn handle(&self, event: &DomainEvent) -> Result<()> {
            if event.device() == "tv" {
                panic!("subscriber blew up");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_contained() {
        let bus = EventBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        bus.subscribe(Arc::new(Panicking));
        bus.subscribe(recorder("after", &log, false));

        let invoked = bus
            .publish(DomainEvent::availability_changed("tv", true))
            .await;

        assert_eq!(invoked, 2);
        assert_eq!(*log.lock(), ["after"]);
    }

    #[test]
    fn test_panic_message_downcasts_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let fixed: Box<dyn Any + Send> = Box::new("fixed");
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(fixed.as_ref()), "fixed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_unsubscribe_device_handler() {
        let bus = EventBus::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let id = bus.subscribe_device("tv", recorder("tv", &log, false));
        assert_eq!(bus.subscriber_count(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);

        let invoked = bus
            .publish(DomainEvent::availability_changed("tv", true))
            .await;
        assert_eq!(invoked, 0);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_watch_receives_published_events() {
        let bus = EventBus::new();
        let mut stream = bus.watch();

        bus.publish(DomainEvent::availability_changed("tv", true))
            .await;

        let event = stream.next().await.unwrap();
        assert_eq!(event, DomainEvent::availability_changed("tv", true));
    }
}
