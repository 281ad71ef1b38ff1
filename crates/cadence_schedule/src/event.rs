//! Event sources the scheduler can subscribe to.
//!
//! An [`EventSource`] is anything that can hand out a [`Connection`] for a
//! callback. The scheduler uses sources in two places:
//!
//! - [`Scheduler::insert_on_event`](crate::scheduler::Scheduler::insert_on_event)
//!   runs a phase or pipeline every time the event fires.
//! - [`on_event`](crate::condition::on_event) turns an event into a run
//!   condition plus a payload reader.
//!
//! Two in-process sources ship with the crate: [`Signal`] (one unnamed
//! channel) and [`SignalHub`] (many channels addressed by name).
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use cadence_schedule::event::{EventSource, Signal};
//!
//! let signal = Signal::<u32>::new();
//! let total = Arc::new(AtomicU32::new(0));
//! let sink = Arc::clone(&total);
//!
//! let mut connection = signal
//!     .connect(None, Arc::new(move |value: &u32| {
//!         sink.fetch_add(*value, Ordering::SeqCst);
//!     }))
//!     .expect("signal accepts unnamed subscriptions");
//!
//! signal.fire(&2);
//! connection.disconnect();
//! signal.fire(&5);
//!
//! assert_eq!(total.load(Ordering::SeqCst), 2);
//! ```

use core::fmt;
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use parking_lot::Mutex;

/// Callback invoked with each event payload.
pub type EventCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Errors raised when subscribing to an event source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// The source has no event with this name.
    #[error("event source has no event named '{0}'")]
    UnknownEvent(String),
    /// The source only accepts named subscriptions.
    #[error("event source requires an event name")]
    MissingEventName,
}

/// Something that emits events a callback can subscribe to.
pub trait EventSource<T>: Send + Sync {
    /// Subscribes `callback` to the source.
    ///
    /// `event` selects a named event on multiplexed sources and must be
    /// `None` for single-channel sources.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] if the name is not valid for this source.
    fn connect(&self, event: Option<&str>, callback: EventCallback<T>)
    -> Result<Connection, EventError>;
}

/// An active subscription.
///
/// Dropping the connection disconnects it.
pub struct Connection {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Connection {
    /// Creates a connection that runs `teardown` once when disconnected.
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Creates a connection with nothing to tear down.
    #[must_use]
    pub fn detached() -> Self {
        Self { teardown: None }
    }

    /// Ends the subscription. Calling it again does nothing.
    pub fn disconnect(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    /// Returns true until [`disconnect`](Self::disconnect) runs.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.teardown.is_some()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signal
// ─────────────────────────────────────────────────────────────────────────────

struct Slots<T> {
    next_id: u64,
    callbacks: Vec<(u64, EventCallback<T>)>,
}

/// A single-channel, in-process event.
///
/// Clones share subscribers.
pub struct Signal<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: 'static> Signal<T> {
    /// Creates a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Calls every subscriber with `payload`.
    ///
    /// Subscribers are snapshotted first, so a callback may connect or
    /// disconnect without deadlocking.
    pub fn fire(&self, payload: &T) {
        let callbacks: Vec<EventCallback<T>> = self
            .slots
            .lock()
            .callbacks
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(payload);
        }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.slots.lock().callbacks.len()
    }

    fn subscribe(&self, callback: EventCallback<T>) -> Connection {
        let id = {
            let mut slots = self.slots.lock();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.callbacks.push((id, callback));
            id
        };
        let slots: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        Connection::new(move || {
            if let Some(slots) = slots.upgrade() {
                slots.lock().callbacks.retain(|(slot, _)| *slot != id);
            }
        })
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.slots.lock().callbacks.len())
            .finish()
    }
}

impl<T: 'static> EventSource<T> for Signal<T> {
    fn connect(
        &self,
        event: Option<&str>,
        callback: EventCallback<T>,
    ) -> Result<Connection, EventError> {
        match event {
            Some(name) => Err(EventError::UnknownEvent(name.to_owned())),
            None => Ok(self.subscribe(callback)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SignalHub
// ─────────────────────────────────────────────────────────────────────────────

/// A set of [`Signal`]s addressed by name.
///
/// Channels are created on first subscription. Firing a channel nobody
/// subscribed to does nothing.
pub struct SignalHub<T> {
    channels: Arc<Mutex<HashMap<String, Signal<T>>>>,
}

impl<T: 'static> SignalHub<T> {
    /// Creates a hub with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the channel called `event`, creating it if needed.
    #[must_use]
    pub fn channel(&self, event: &str) -> Signal<T> {
        self.channels
            .lock()
            .entry_ref(event)
            .or_insert_with(Signal::new)
            .clone()
    }

    /// Fires the channel called `event`.
    pub fn fire(&self, event: &str, payload: &T) {
        let channel = self.channels.lock().get(event).cloned();
        if let Some(channel) = channel {
            channel.fire(payload);
        }
    }
}

impl<T: 'static> Default for SignalHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SignalHub<T> {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}

impl<T> fmt::Debug for SignalHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels.lock();
        f.debug_struct("SignalHub")
            .field("channels", &channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: 'static> EventSource<T> for SignalHub<T> {
    fn connect(
        &self,
        event: Option<&str>,
        callback: EventCallback<T>,
    ) -> Result<Connection, EventError> {
        let name = event.ok_or(EventError::MissingEventName)?;
        Ok(self.channel(name).subscribe(callback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, EventCallback<()>) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let callback: EventCallback<()> = Arc::new(move |_: &()| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn signal_rejects_named_subscriptions() {
        let signal = Signal::<()>::new();
        let (_, callback) = counter();

        let error = signal
            .connect(Some("tick"), callback)
            .expect_err("named subscription must fail");
        assert_eq!(error, EventError::UnknownEvent("tick".to_owned()));
    }

    #[test]
    fn dropping_connection_unsubscribes() {
        let signal = Signal::<()>::new();
        let (count, callback) = counter();

        let connection = signal.connect(None, callback).expect("connect should succeed");
        assert_eq!(signal.connection_count(), 1);
        drop(connection);

        signal.fire(&());
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let signal = Signal::<()>::new();
        let (_, callback) = counter();
        let mut connection = signal.connect(None, callback).expect("connect should succeed");

        connection.disconnect();
        connection.disconnect();

        assert!(!connection.is_connected());
    }

    #[test]
    fn callback_may_disconnect_during_fire() {
        let signal = Signal::<()>::new();
        let slot: Arc<Mutex<Option<Connection>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let connection = signal
            .connect(
                None,
                Arc::new(move |_: &()| {
                    if let Some(mut connection) = inner.lock().take() {
                        connection.disconnect();
                    }
                }),
            )
            .expect("connect should succeed");
        *slot.lock() = Some(connection);

        signal.fire(&());

        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn hub_routes_by_name() {
        let hub = SignalHub::<()>::new();
        let (count, callback) = counter();
        let _connection = hub
            .connect(Some("jump"), callback)
            .expect("connect should succeed");

        hub.fire("land", &());
        hub.fire("jump", &());

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hub_requires_a_name() {
        let hub = SignalHub::<()>::new();
        let (_, callback) = counter();

        let error = hub.connect(None, callback).expect_err("unnamed subscription must fail");
        assert_eq!(error, EventError::MissingEventName);
    }
}
