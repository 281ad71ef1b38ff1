//! Run conditions.
//!
//! A [`Condition`] is a stateful predicate the scheduler evaluates before
//! running a system, phase, or pipeline. Any `FnMut() -> bool` closure is a
//! condition; the factories in this module cover the common cases.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cadence_schedule::prelude::*;
//!
//! fn save_world() {}
//!
//! let scheduler = Scheduler::new(());
//! let autosave = SystemHandle::new(save_world);
//!
//! scheduler.add_system(&autosave)?;
//! scheduler.set_run_condition(&autosave, time_passed(Duration::from_secs(30)))?;
//! scheduler.run_all();
//! # Ok::<(), ScheduleError>(())
//! ```
//!
//! Conditions that hold event subscriptions release them in
//! [`Condition::cleanup`] and again on drop, so forgetting to clean up
//! never leaks a connection.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::event::{Connection, EventError, EventSource};
use crate::time::Clock;

/// A stateful predicate gating execution.
pub trait Condition: Send + 'static {
    /// Returns true if the gated target should run.
    fn evaluate(&mut self) -> bool;

    /// Releases resources held by the condition.
    ///
    /// Must be safe to call repeatedly, and before any evaluation.
    fn cleanup(&mut self) {}
}

impl<F> Condition for F
where
    F: FnMut() -> bool + Send + 'static,
{
    fn evaluate(&mut self) -> bool {
        self()
    }
}

/// Boxed condition as stored by the scheduler.
pub type BoxedCondition = Box<dyn Condition>;

/// Calls [`Condition::cleanup`].
pub fn cleanup_condition<C: Condition + ?Sized>(condition: &mut C) {
    condition.cleanup();
}

// ─────────────────────────────────────────────────────────────────────────────
// run_once
// ─────────────────────────────────────────────────────────────────────────────

/// Condition that is true on its first evaluation only.
#[derive(Debug, Default)]
pub struct RunOnce {
    done: bool,
}

impl Condition for RunOnce {
    fn evaluate(&mut self) -> bool {
        !core::mem::replace(&mut self.done, true)
    }
}

/// Returns a condition that is true exactly once.
#[must_use]
pub fn run_once() -> RunOnce {
    RunOnce::default()
}

// ─────────────────────────────────────────────────────────────────────────────
// time_passed
// ─────────────────────────────────────────────────────────────────────────────

/// Condition that opens once per elapsed window.
#[derive(Debug)]
pub struct TimePassed {
    clock: Clock,
    period: Duration,
    since: Instant,
}

impl Condition for TimePassed {
    fn evaluate(&mut self) -> bool {
        let now = self.clock.now();
        if now.saturating_duration_since(self.since) >= self.period {
            self.since = now;
            true
        } else {
            false
        }
    }
}

/// Returns a condition that is true when at least `period` has elapsed since
/// it was created or last returned true, measured by the system clock.
#[must_use]
pub fn time_passed(period: Duration) -> TimePassed {
    time_passed_with_clock(period, Clock::system())
}

/// Like [`time_passed`], reading time from `clock`.
#[must_use]
pub fn time_passed_with_clock(period: Duration, clock: Clock) -> TimePassed {
    TimePassed {
        since: clock.now(),
        clock,
        period,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// is_not
// ─────────────────────────────────────────────────────────────────────────────

/// Negation of another condition.
#[derive(Debug)]
pub struct IsNot<C> {
    inner: C,
}

impl<C: Condition> Condition for IsNot<C> {
    fn evaluate(&mut self) -> bool {
        !self.inner.evaluate()
    }

    fn cleanup(&mut self) {
        self.inner.cleanup();
    }
}

/// Returns the negation of `condition`.
#[must_use]
pub fn is_not<C: Condition>(condition: C) -> IsNot<C> {
    IsNot { inner: condition }
}

// ─────────────────────────────────────────────────────────────────────────────
// on_event
// ─────────────────────────────────────────────────────────────────────────────

struct EventQueue<T> {
    fired: bool,
    payloads: Vec<T>,
}

struct Subscription<T> {
    queue: Mutex<EventQueue<T>>,
    connection: Mutex<Connection>,
}

impl<T> Subscription<T> {
    fn disconnect(&self) {
        self.connection.lock().disconnect();
    }
}

/// Condition that is true on evaluations where its event fired since the
/// previous evaluation.
///
/// Created by [`on_event`].
pub struct OnEvent<T> {
    subscription: Arc<Subscription<T>>,
}

impl<T: Send + 'static> Condition for OnEvent<T> {
    fn evaluate(&mut self) -> bool {
        core::mem::take(&mut self.subscription.queue.lock().fired)
    }

    fn cleanup(&mut self) {
        self.subscription.disconnect();
    }
}

impl<T> Drop for OnEvent<T> {
    fn drop(&mut self) {
        self.subscription.disconnect();
    }
}

impl<T> fmt::Debug for OnEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnEvent")
            .field("connected", &self.subscription.connection.lock().is_connected())
            .finish_non_exhaustive()
    }
}

/// Drains payloads collected by an [`OnEvent`] subscription.
pub struct EventReader<T> {
    subscription: Arc<Subscription<T>>,
}

impl<T> EventReader<T> {
    /// Takes every payload received since the last read, oldest first.
    ///
    /// Returns an empty iterator if nothing fired.
    pub fn read(&self) -> std::vec::IntoIter<T> {
        core::mem::take(&mut self.subscription.queue.lock().payloads).into_iter()
    }

    /// Returns the number of payloads waiting to be read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscription.queue.lock().payloads.len()
    }

    /// Returns true if no payload is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for EventReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventReader")
            .field("pending", &self.len())
            .finish()
    }
}

/// Disconnects an [`on_event`] subscription.
pub struct Teardown {
    disconnect: Box<dyn Fn() + Send + Sync>,
}

impl Teardown {
    /// Disconnects from the event source. Calling it again does nothing.
    pub fn disconnect(&self) {
        (self.disconnect)();
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown").finish_non_exhaustive()
    }
}

/// Subscribes to `event` on `source`.
///
/// Returns the condition, a reader for the payloads, and a teardown handle.
/// All three share the subscription; payloads queue until read.
///
/// # Errors
///
/// Returns [`EventError`] if the source rejects the subscription.
pub fn on_event<T, S>(
    source: &S,
    event: Option<&str>,
) -> Result<(OnEvent<T>, EventReader<T>, Teardown), EventError>
where
    T: Clone + Send + 'static,
    S: EventSource<T> + ?Sized,
{
    let subscription = Arc::new(Subscription {
        queue: Mutex::new(EventQueue {
            fired: false,
            payloads: Vec::new(),
        }),
        connection: Mutex::new(Connection::detached()),
    });

    let sink = Arc::downgrade(&subscription);
    let connection = source.connect(
        event,
        Arc::new(move |payload: &T| {
            if let Some(subscription) = sink.upgrade() {
                let mut queue = subscription.queue.lock();
                queue.fired = true;
                queue.payloads.push(payload.clone());
            }
        }),
    )?;
    *subscription.connection.lock() = connection;

    let teardown = {
        let subscription = Arc::clone(&subscription);
        Teardown {
            disconnect: Box::new(move || subscription.disconnect()),
        }
    };

    Ok((
        OnEvent {
            subscription: Arc::clone(&subscription),
        },
        EventReader { subscription },
        teardown,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Signal;
    use crate::time::MockClock;

    #[test]
    fn run_once_fires_once() {
        let mut condition = run_once();

        assert!(condition.evaluate());
        assert!(!condition.evaluate());
        assert!(!condition.evaluate());
    }

    #[test]
    fn closures_are_conditions() {
        let mut calls = 0;
        let mut condition = move || {
            calls += 1;
            calls % 2 == 0
        };

        assert!(!condition.evaluate());
        assert!(condition.evaluate());
    }

    #[test]
    fn is_not_negates() {
        let mut condition = is_not(run_once());

        assert!(!condition.evaluate());
        assert!(condition.evaluate());
    }

    #[test]
    fn time_passed_waits_for_window() {
        let mock = Arc::new(MockClock::new(Instant::now()));
        let mut condition =
            time_passed_with_clock(Duration::from_secs(1), Clock::with_provider(mock.clone()));

        assert!(!condition.evaluate());
        mock.advance(Duration::from_millis(999));
        assert!(!condition.evaluate());
        mock.advance(Duration::from_millis(1));
        assert!(condition.evaluate());
        assert!(!condition.evaluate());
        mock.advance(Duration::from_secs(3));
        assert!(condition.evaluate());
    }

    #[test]
    fn on_event_tracks_fires_and_payloads() {
        let signal = Signal::<u32>::new();
        let (mut condition, reader, _teardown) =
            on_event(&signal, None).expect("subscription should succeed");

        assert!(!condition.evaluate());

        signal.fire(&1);
        signal.fire(&2);

        assert!(condition.evaluate());
        assert!(!condition.evaluate());
        assert_eq!(reader.read().collect::<Vec<_>>(), vec![1, 2]);
        assert!(reader.is_empty());
    }

    #[test]
    fn on_event_rejects_bad_name() {
        let signal = Signal::<u32>::new();
        let error = on_event(&signal, Some("nope")).expect_err("named signal subscription must fail");

        assert_eq!(error, EventError::UnknownEvent("nope".to_owned()));
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn teardown_is_idempotent() {
        let signal = Signal::<u32>::new();
        let (mut condition, reader, teardown) =
            on_event(&signal, None).expect("subscription should succeed");

        teardown.disconnect();
        teardown.disconnect();
        signal.fire(&7);

        assert_eq!(signal.connection_count(), 0);
        assert!(!condition.evaluate());
        assert!(reader.is_empty());
    }

    #[test]
    fn cleanup_releases_subscription() {
        let signal = Signal::<u32>::new();
        let (mut condition, _reader, _teardown) =
            on_event(&signal, None).expect("subscription should succeed");

        cleanup_condition(&mut condition);
        cleanup_condition(&mut condition);

        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn dropping_condition_releases_subscription() {
        let signal = Signal::<u32>::new();
        let (condition, _reader, _teardown) =
            on_event(&signal, None).expect("subscription should succeed");

        drop(condition);

        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn cleanup_before_evaluation_is_safe() {
        let mut condition = is_not(run_once());
        cleanup_condition(&mut condition);

        assert!(!condition.evaluate());
    }
}
