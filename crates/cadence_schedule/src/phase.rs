//! Phases: the ordering tokens systems are grouped under.
//!
//! A [`Phase`] carries no state of its own. It is an identity (a [`PhaseId`])
//! plus an optional debug name; everything about *where* a phase runs lives
//! in the [`Scheduler`](crate::scheduler::Scheduler) it was inserted into.
//! The same phase can therefore be shared between any number of schedulers.
//!
//! # Built-in Phases
//!
//! | Pipeline | Phases (in order) |
//! |----------|-------------------|
//! | [`Pipeline::startup()`](crate::pipeline::Pipeline::startup) | [`PRE_STARTUP`](Phase::PRE_STARTUP), [`STARTUP`](Phase::STARTUP), [`POST_STARTUP`](Phase::POST_STARTUP) |
//! | [`Pipeline::main()`](crate::pipeline::Pipeline::main) | [`FIRST`](Phase::FIRST), [`PRE_UPDATE`](Phase::PRE_UPDATE), [`UPDATE`](Phase::UPDATE), [`POST_UPDATE`](Phase::POST_UPDATE), [`LAST`](Phase::LAST) |
//!
//! # Example
//!
//! ```
//! use cadence_schedule::phase::Phase;
//!
//! let render = Phase::named("Render");
//! let copy = render.clone();
//!
//! assert_eq!(render, copy);
//! assert_ne!(render, Phase::named("Render"));
//! assert_eq!(render.name(), Some("Render"));
//! ```

use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};
use std::borrow::Cow;

/// Ids below this value are reserved for built-in phases and pipelines.
pub(crate) const FIRST_DYNAMIC_ID: u64 = 1 << 32;

static NEXT_PHASE_ID: AtomicU64 = AtomicU64::new(FIRST_DYNAMIC_ID);

/// Process-unique identifier of a [`Phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseId(u64);

impl PhaseId {
    /// Returns the raw id value.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase#{}", self.0)
    }
}

/// An ordered execution slot.
///
/// Equality and hashing use identity only: two phases created with the same
/// name are still different phases.
#[derive(Clone)]
pub struct Phase {
    id: PhaseId,
    name: Option<Cow<'static, str>>,
}

impl Phase {
    /// Runs before [`STARTUP`](Self::STARTUP).
    pub const PRE_STARTUP: Phase = Phase::builtin(1, "PreStartup");
    /// One-shot initialization. Gated by `run_once` in the default pipelines.
    pub const STARTUP: Phase = Phase::builtin(2, "Startup");
    /// Runs after [`STARTUP`](Self::STARTUP).
    pub const POST_STARTUP: Phase = Phase::builtin(3, "PostStartup");
    /// First phase of every main pass.
    pub const FIRST: Phase = Phase::builtin(4, "First");
    /// Runs before [`UPDATE`](Self::UPDATE).
    pub const PRE_UPDATE: Phase = Phase::builtin(5, "PreUpdate");
    /// Default phase for systems added without an explicit phase.
    pub const UPDATE: Phase = Phase::builtin(6, "Update");
    /// Runs after [`UPDATE`](Self::UPDATE).
    pub const POST_UPDATE: Phase = Phase::builtin(7, "PostUpdate");
    /// Last phase of every main pass.
    pub const LAST: Phase = Phase::builtin(8, "Last");

    const fn builtin(id: u64, name: &'static str) -> Self {
        Self {
            id: PhaseId(id),
            name: Some(Cow::Borrowed(name)),
        }
    }

    /// Creates a new anonymous phase with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: PhaseId(NEXT_PHASE_ID.fetch_add(1, Ordering::Relaxed)),
            name: None,
        }
    }

    /// Creates a new phase with a fresh identity and a debug name.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new()
        }
    }

    /// Returns the phase's identity.
    #[must_use]
    pub fn id(&self) -> PhaseId {
        self.id
    }

    /// Returns the debug name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Default for Phase {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Phase {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Phase {}

impl Hash for Phase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.id),
        }
    }
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Phase")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .finish()
    }
}
