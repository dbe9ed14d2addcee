//! Profile notifications and observers.

use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use profile_common::DataErrorKind;
use tracing::debug;

/// Where a loaded profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// The primary file.
    Primary,
    /// The backup slot, after the primary failed.
    Backup,
    /// Freshly created defaults.
    Default,
}

/// Notification fired when a store operation completes.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileEvent {
    /// A profile is loaded and valid.
    Loaded {
        /// Origin of the profile
        source: LoadSource,
    },
    /// The profile was written to disk.
    Saved,
    /// A stored profile was upgraded.
    Migrated {
        /// Version found on disk
        from: u32,
        /// Version after migration
        to: u32,
    },
    /// Invariant violations were coerced during load.
    Repaired {
        /// Repaired field names
        fields: Vec<&'static str>,
    },
    /// An operation failed or fell back.
    DataError {
        /// Failure classification
        kind: DataErrorKind,
        /// Human-readable reason
        reason: String,
    },
}

/// Receives profile notifications.
pub trait ProfileObserver: Send {
    /// Handles an event.
    fn on_event(&self, event: &ProfileEvent);
}

impl<F> ProfileObserver for F
where
    F: Fn(&ProfileEvent) + Send,
{
    fn on_event(&self, event: &ProfileEvent) {
        self(event);
    }
}

/// Forwards events into a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<ProfileEvent>,
}

impl ChannelObserver {
    /// Creates an observer publishing to `sender`.
    #[must_use]
    pub fn new(sender: Sender<ProfileEvent>) -> Self {
        Self { sender }
    }
}

impl ProfileObserver for ChannelObserver {
    fn on_event(&self, event: &ProfileEvent) {
        // Non-blocking send - if full or disconnected, event is dropped
        let _ = self.sender.try_send(event.clone());
    }
}

/// Records events in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ProfileEvent>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ProfileEvent> {
        self.events.lock().clone()
    }

    /// Drains all recorded events.
    pub fn take(&self) -> Vec<ProfileEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl ProfileObserver for EventLog {
    fn on_event(&self, event: &ProfileEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Delivers events synchronously, in subscription order.
#[derive(Default)]
pub struct EventDispatcher {
    observers: Vec<Box<dyn ProfileObserver>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    pub fn subscribe(&mut self, observer: Box<dyn ProfileObserver>) {
        self.observers.push(observer);
    }

    /// Sends `event` to every observer.
    pub fn emit(&self, event: &ProfileEvent) {
        debug!(?event, "profile event");
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_dispatch_in_order_to_all_observers() {
        let log_a = EventLog::new();
        let log_b = EventLog::new();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Box::new(log_a.clone()));
        dispatcher.subscribe(Box::new(log_b.clone()));

        dispatcher.emit(&ProfileEvent::Saved);
        dispatcher.emit(&ProfileEvent::Loaded {
            source: LoadSource::Primary,
        });

        let expected = vec![
            ProfileEvent::Saved,
            ProfileEvent::Loaded {
                source: LoadSource::Primary,
            },
        ];
        assert_eq!(log_a.events(), expected);
        assert_eq!(log_b.take(), expected);
        assert!(log_b.events().is_empty());
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Box::new(move |_: &ProfileEvent| *counter.lock() += 1));

        dispatcher.emit(&ProfileEvent::Saved);
        dispatcher.emit(&ProfileEvent::Saved);
        assert_eq!(*seen.lock(), 2);
    }

    #[test]
    fn test_channel_observer() {
        let (tx, rx) = unbounded();
        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(Box::new(ChannelObserver::new(tx)));

        dispatcher.emit(&ProfileEvent::Migrated { from: 1, to: 4 });
        assert_eq!(
            rx.try_recv().expect("event"),
            ProfileEvent::Migrated { from: 1, to: 4 }
        );
    }

    #[test]
    fn test_disconnected_channel_is_ignored() {
        let (tx, rx) = unbounded();
        drop(rx);
        let observer = ChannelObserver::new(tx);
        observer.on_event(&ProfileEvent::Saved);
    }
}
