//! Hook registration and invocation.
//!
//! The [`HooksAPI`] stores hooks per hook point and runs them for the
//! scheduler that owns it. Reach it through
//! [`Scheduler::hooks`](crate::scheduler::Scheduler::hooks).
//!
//! # Observers vs Call Hooks
//!
//! - **Observers** ([`register_observer`](HooksAPI::register_observer)) react
//!   to a [`ScheduleEvent`] after the fact. Use them for logging and metrics.
//! - **Call hooks** ([`register_call_hook`](HooksAPI::register_call_hook))
//!   wrap a system invocation as middleware. They receive a [`Next`] and
//!   choose whether to run it, how often, and what to do around it.
//!
//! # Example
//!
//! ```
//! use cadence_schedule::prelude::*;
//!
//! let scheduler = Scheduler::new(());
//! let hooks = scheduler.hooks();
//!
//! hooks.register_observer::<(OnSystemAdd, OnSystemRemove), _>(
//!     "registry-log",
//!     |_scheduler, event| println!("{}: {:?}", event.hook_name(), event.system()),
//! )?;
//!
//! hooks.register_call_hook::<OnSystemCall, _>("timer", |info, mut next| {
//!     let start = std::time::Instant::now();
//!     next.run();
//!     println!("{} took {:?}", info.name(), start.elapsed());
//! })?;
//!
//! scheduler.add_system(|| {})?;
//! scheduler.run_all();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Isolation
//!
//! Every hook runs inside `catch_unwind`. A panicking hook is logged and the
//! remaining hooks still run. If a call hook panics before running its
//! continuation, the scheduler runs the continuation for it so the system
//! body is not lost.

use core::cell::Cell;
use core::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use super::events::ScheduleEvent;
use super::schedule::{CallPoint, HookId, IntoHookIds};
use crate::scheduler::Scheduler;
use crate::system::{SystemInfo, panic_message};

// ─────────────────────────────────────────────────────────────────────────────
// Next
// ─────────────────────────────────────────────────────────────────────────────

/// Continuation handed to call hooks.
///
/// Running it invokes the remaining hook layers and, finally, the system.
pub struct Next<'a> {
    continuation: &'a mut dyn FnMut(),
}

impl<'a> Next<'a> {
    pub(crate) fn new(continuation: &'a mut dyn FnMut()) -> Self {
        Self { continuation }
    }

    /// Runs the rest of the call chain. May be called more than once.
    pub fn run(&mut self) {
        (self.continuation)();
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BoxedHook
// ─────────────────────────────────────────────────────────────────────────────

type ObserverFn<A> = dyn Fn(&Scheduler<A>, &ScheduleEvent<A>) + Send + Sync;
type CallFn<A> = dyn for<'n> Fn(&SystemInfo<A>, Next<'n>) + Send + Sync;

/// Type-erased hook.
///
/// Most users should use [`HooksAPI::register_observer`] or
/// [`HooksAPI::register_call_hook`] instead of creating `BoxedHook` directly.
pub enum BoxedHook<A> {
    /// Receives schedule events.
    Observer(Arc<ObserverFn<A>>),
    /// Wraps system calls.
    Call(Arc<CallFn<A>>),
}

impl<A> BoxedHook<A> {
    /// Boxes an observer.
    pub fn observer(
        hook: impl Fn(&Scheduler<A>, &ScheduleEvent<A>) + Send + Sync + 'static,
    ) -> Self {
        Self::Observer(Arc::new(hook))
    }

    /// Boxes a call hook.
    pub fn call(hook: impl for<'n> Fn(&SystemInfo<A>, Next<'n>) + Send + Sync + 'static) -> Self {
        Self::Call(Arc::new(hook))
    }
}

impl<A> Clone for BoxedHook<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Observer(hook) => Self::Observer(Arc::clone(hook)),
            Self::Call(hook) => Self::Call(Arc::clone(hook)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookRegistrationError
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during hook registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookRegistrationError {
    /// A hook with this name already exists on the hook point.
    #[error("hook '{name}' already registered for '{}'", .hook.short_name())]
    DuplicateName {
        /// The hook point where the duplicate was found.
        hook: HookId,
        /// The duplicate hook name.
        name: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// HookEntry
// ─────────────────────────────────────────────────────────────────────────────

struct HookEntry<A> {
    name: String,
    hook: BoxedHook<A>,
}

// ─────────────────────────────────────────────────────────────────────────────
// HooksAPI
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of scheduler hooks, keyed by hook point.
///
/// Registration and invocation may interleave freely: invocation works on a
/// snapshot of the entries, so a hook may register further hooks. Those take
/// effect from the next invocation.
pub struct HooksAPI<A> {
    hooks: RwLock<HashMap<HookId, Vec<Arc<HookEntry<A>>>>>,
}

impl<A> Default for HooksAPI<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for HooksAPI<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read();
        let mut map = f.debug_map();
        for (hook, entries) in hooks.iter() {
            map.entry(
                &hook.short_name(),
                &entries.iter().map(|entry| entry.name.as_str()).collect::<Vec<_>>(),
            );
        }
        map.finish()
    }
}

impl<A> HooksAPI<A> {
    /// Creates a new empty hooks registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an observer on one or more observer points.
    ///
    /// `H` is a single marker such as [`OnSystemAdd`](super::schedule::OnSystemAdd)
    /// or a tuple of markers. When registering on several points, the name is
    /// suffixed with `@Marker` per point.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if the name is taken
    /// on any of the points. Points registered before the failing one keep
    /// the hook.
    pub fn register_observer<H, F>(
        &self,
        name: impl Into<String>,
        hook: F,
    ) -> Result<&Self, HookRegistrationError>
    where
        H: IntoHookIds,
        F: Fn(&Scheduler<A>, &ScheduleEvent<A>) + Send + Sync + 'static,
    {
        let points = H::hook_ids();
        let name = name.into();
        let hook: Arc<ObserverFn<A>> = Arc::new(hook);

        for point in &points {
            let hook_name = if points.len() > 1 {
                format!("{}@{}", name, point.short_name())
            } else {
                name.clone()
            };
            self.register_boxed(*point, hook_name, BoxedHook::Observer(Arc::clone(&hook)))?;
        }
        Ok(self)
    }

    /// Registers a call hook on a call point.
    ///
    /// Hooks registered earlier wrap hooks registered later.
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if the name is taken.
    pub fn register_call_hook<H, F>(
        &self,
        name: impl Into<String>,
        hook: F,
    ) -> Result<&Self, HookRegistrationError>
    where
        H: CallPoint,
        F: for<'n> Fn(&SystemInfo<A>, Next<'n>) + Send + Sync + 'static,
    {
        self.register_boxed(HookId::of::<H>(), name, BoxedHook::call(hook))?;
        Ok(self)
    }

    /// Registers a pre-built [`BoxedHook`] for the given hook point.
    ///
    /// This is the lower-level registration method used by both
    /// [`register_observer`](Self::register_observer) and
    /// [`register_call_hook`](Self::register_call_hook).
    ///
    /// # Errors
    ///
    /// Returns [`HookRegistrationError::DuplicateName`] if the name is taken.
    pub fn register_boxed(
        &self,
        hook_id: HookId,
        name: impl Into<String>,
        hook: BoxedHook<A>,
    ) -> Result<(), HookRegistrationError> {
        let name = name.into();

        let mut hooks = self.hooks.write();
        let entries = hooks.entry(hook_id).or_default();

        if entries.iter().any(|entry| entry.name == name) {
            return Err(HookRegistrationError::DuplicateName {
                hook: hook_id,
                name,
            });
        }

        tracing::debug!(hook = hook_id.short_name(), name = %name, "hook registered");
        entries.push(Arc::new(HookEntry { name, hook }));
        Ok(())
    }

    /// Removes the hook called `name` from a hook point.
    ///
    /// Returns true if a hook was removed.
    pub fn unregister(&self, hook_id: HookId, name: &str) -> bool {
        let mut hooks = self.hooks.write();
        let Some(entries) = hooks.get_mut(&hook_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        before != entries.len()
    }

    /// Returns the number of hooks registered for the given hook point.
    #[must_use]
    pub fn hook_count(&self, hook_id: HookId) -> usize {
        let hooks = self.hooks.read();
        hooks.get(&hook_id).map_or(0, Vec::len)
    }

    /// Checks if a hook with the given name exists on the hook point.
    #[must_use]
    pub fn contains_hook(&self, hook_id: HookId, name: &str) -> bool {
        let hooks = self.hooks.read();
        hooks
            .get(&hook_id)
            .is_some_and(|entries| entries.iter().any(|entry| entry.name == name))
    }

    fn snapshot(&self, hook_id: HookId) -> Vec<Arc<HookEntry<A>>> {
        self.hooks.read().get(&hook_id).cloned().unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Invocation
    // ─────────────────────────────────────────────────────────────────────

    /// Delivers `event` to every observer on its hook point, in
    /// registration order.
    pub(crate) fn notify(&self, scheduler: &Scheduler<A>, event: &ScheduleEvent<A>) {
        for entry in self.snapshot(event.hook_id()) {
            let BoxedHook::Observer(hook) = &entry.hook else {
                continue;
            };
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(scheduler, event))) {
                tracing::warn!(
                    hook = event.hook_name(),
                    name = %entry.name,
                    panic = %panic_message(payload.as_ref()),
                    "observer hook panicked"
                );
            }
        }
    }

    /// Runs `body` wrapped in every call hook on `hook_id`.
    pub(crate) fn wrap_call(&self, hook_id: HookId, info: &SystemInfo<A>, body: &mut dyn FnMut()) {
        let entries = self.snapshot(hook_id);
        Self::chain(&entries, info, body);
    }

    fn chain(entries: &[Arc<HookEntry<A>>], info: &SystemInfo<A>, body: &mut dyn FnMut()) {
        let Some((first, rest)) = entries.split_first() else {
            body();
            return;
        };
        let BoxedHook::Call(hook) = &first.hook else {
            Self::chain(rest, info, body);
            return;
        };

        let continued = Cell::new(false);
        let mut continuation = || {
            continued.set(true);
            Self::chain(rest, info, body);
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| hook(info, Next::new(&mut continuation))));

        if let Err(payload) = outcome {
            tracing::warn!(
                name = %first.name,
                system = info.name(),
                panic = %panic_message(payload.as_ref()),
                "call hook panicked"
            );
            if !continued.get() {
                Self::chain(rest, info, body);
            }
        }
    }
}
