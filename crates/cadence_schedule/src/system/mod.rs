//! System execution primitives.
//!
//! A system is a unit of work the scheduler calls once per pass of the phase
//! it belongs to. Plain functions and closures become systems through
//! [`IntoSystem`]; the two supported shapes are `Fn()` and
//! `Fn(&SystemContext<A>)`, each returning either `()` or a
//! `Result<(), E>` whose error implements [`Display`](core::fmt::Display).
//!
//! # Identity
//!
//! The scheduler tracks systems by [`SystemId`], not by function pointer.
//! Wrap a system in a [`SystemHandle`] when you need to address it again
//! later (remove, replace, run, or attach a condition):
//!
//! ```
//! use cadence_schedule::prelude::*;
//!
//! fn physics() {}
//!
//! let scheduler = Scheduler::new(());
//! let handle = SystemHandle::new(physics);
//! scheduler.add_system(&handle)?;
//! scheduler.add_run_condition(&handle, run_once())?;
//! scheduler.run_all().run_all();
//! scheduler.remove_system(&handle)?;
//! # Ok::<(), ScheduleError>(())
//! ```
//!
//! Passing a function directly to `add_system` mints a fresh handle each time,
//! so the same function can be registered more than once.

mod info;

pub use info::{SystemContext, SystemInfo};

use core::any::{Any, type_name};
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};
use std::borrow::Cow;
use std::sync::Arc;

/// Errors produced by a system body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SystemError {
    /// The system returned an error.
    #[error("{0}")]
    Failed(String),

    /// The system panicked.
    #[error("system panicked: {0}")]
    Panicked(String),
}

impl SystemError {
    /// Creates a [`SystemError::Failed`] from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

static NEXT_SYSTEM_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered system handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(u64);

impl SystemId {
    fn next() -> Self {
        Self(NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// An executable unit of work.
///
/// Most users won't implement `System` directly; functions and closures are
/// converted through [`IntoSystem`]. Implement it on a struct when the system
/// needs configuration of its own.
pub trait System<A>: Send + Sync {
    /// Runs the system once.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError`] if the work failed. The scheduler logs the
    /// error, records it on the system, and continues the pass.
    fn run(&self, ctx: &SystemContext<A>) -> Result<(), SystemError>;

    /// Returns the system's name for logs and diagnostics.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(type_name::<Self>())
    }
}

/// Shared, type-erased system.
pub type BoxedSystem<A> = Arc<dyn System<A>>;

/// Converts a type into a [`System`].
///
/// # Marker Types
///
/// The `Marker` parameter lets one function type pick among several
/// implementations (no arguments, context argument, or an existing system).
pub trait IntoSystem<A, Marker>: Sized {
    /// The resulting system type.
    type System: System<A> + 'static;

    /// Converts this into a system.
    fn into_system(self) -> Self::System;
}

/// Return types a function system may produce.
pub trait SystemOutput {
    /// Normalizes the value into a system result.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::Failed`] carrying the error's display text.
    fn into_result(self) -> Result<(), SystemError>;
}

impl SystemOutput for () {
    fn into_result(self) -> Result<(), SystemError> {
        Ok(())
    }
}

impl<E: fmt::Display> SystemOutput for Result<(), E> {
    fn into_result(self) -> Result<(), SystemError> {
        self.map_err(|error| SystemError::Failed(error.to_string()))
    }
}

/// Marker for types that already implement [`System`].
pub struct SystemMarker;

impl<A, S: System<A> + 'static> IntoSystem<A, SystemMarker> for S {
    type System = S;

    fn into_system(self) -> Self::System {
        self
    }
}

/// A system wrapping a function or closure.
///
/// Created via [`IntoSystem`].
pub struct FunctionSystem<F, Marker> {
    func: F,
    name: &'static str,
    _marker: PhantomData<fn() -> Marker>,
}

impl<F, Marker> FunctionSystem<F, Marker> {
    /// Wraps `func`, naming it after its type.
    pub fn new(func: F) -> Self {
        Self {
            func,
            name: type_name::<F>(),
            _marker: PhantomData,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IntoSystem implementations for functions
// ─────────────────────────────────────────────────────────────────────────────

/// Marker for functions that take no arguments.
pub struct NoArgsMarker;

/// Marker for functions that take a [`SystemContext`].
pub struct ContextMarker;

impl<A, F, R> IntoSystem<A, (NoArgsMarker, R)> for F
where
    A: 'static,
    F: Fn() -> R + Send + Sync + 'static,
    R: SystemOutput + 'static,
{
    type System = FunctionSystem<F, (NoArgsMarker, R)>;

    fn into_system(self) -> Self::System {
        FunctionSystem::new(self)
    }
}

impl<A, F, R> System<A> for FunctionSystem<F, (NoArgsMarker, R)>
where
    A: 'static,
    F: Fn() -> R + Send + Sync + 'static,
    R: SystemOutput + 'static,
{
    fn run(&self, _ctx: &SystemContext<A>) -> Result<(), SystemError> {
        (self.func)().into_result()
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.name)
    }
}

impl<A, F, R> IntoSystem<A, (ContextMarker, R)> for F
where
    A: 'static,
    F: Fn(&SystemContext<A>) -> R + Send + Sync + 'static,
    R: SystemOutput + 'static,
{
    type System = FunctionSystem<F, (ContextMarker, R)>;

    fn into_system(self) -> Self::System {
        FunctionSystem::new(self)
    }
}

impl<A, F, R> System<A> for FunctionSystem<F, (ContextMarker, R)>
where
    A: 'static,
    F: Fn(&SystemContext<A>) -> R + Send + Sync + 'static,
    R: SystemOutput + 'static,
{
    fn run(&self, ctx: &SystemContext<A>) -> Result<(), SystemError> {
        (self.func)(ctx).into_result()
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────────────────────────────────────

/// A system paired with a stable identity.
///
/// Clones share the identity. A handle can be registered with any number of
/// schedulers, but only once per scheduler.
pub struct SystemHandle<A> {
    id: SystemId,
    name: Cow<'static, str>,
    system: BoxedSystem<A>,
}

impl<A: 'static> SystemHandle<A> {
    /// Wraps a system in a new handle with a fresh identity.
    pub fn new<M>(system: impl IntoSystem<A, M>) -> Self {
        let system = system.into_system();
        Self {
            id: SystemId::next(),
            name: system.name(),
            system: Arc::new(system),
        }
    }

    /// Overrides the name reported in logs and diagnostics.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }
}

impl<A> SystemHandle<A> {
    /// Returns the handle's identity.
    #[must_use]
    pub fn id(&self) -> SystemId {
        self.id
    }

    /// Returns the system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn system(&self) -> &BoxedSystem<A> {
        &self.system
    }
}

impl<A> Clone for SystemHandle<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            system: Arc::clone(&self.system),
        }
    }
}

impl<A> fmt::Debug for SystemHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<A> From<&SystemHandle<A>> for SystemId {
    fn from(handle: &SystemHandle<A>) -> Self {
        handle.id
    }
}

/// Anything that can be registered as a system.
///
/// Implemented for [`SystemHandle`] (keeping its identity) and for every
/// [`IntoSystem`] type (minting a new identity).
pub trait IntoSystemHandle<A, Marker> {
    /// Converts this into a handle.
    fn into_handle(self) -> SystemHandle<A>;
}

/// Marker for existing handles.
pub struct HandleMarker;

impl<A> IntoSystemHandle<A, HandleMarker> for SystemHandle<A> {
    fn into_handle(self) -> SystemHandle<A> {
        self
    }
}

impl<A> IntoSystemHandle<A, HandleMarker> for &SystemHandle<A> {
    fn into_handle(self) -> SystemHandle<A> {
        self.clone()
    }
}

impl<A, M, S> IntoSystemHandle<A, (SystemMarker, M)> for S
where
    A: 'static,
    S: IntoSystem<A, M>,
{
    fn into_handle(self) -> SystemHandle<A> {
        SystemHandle::new(self)
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
