//! Event payloads delivered to observer hooks.
//!
//! All observers receive `&ScheduleEvent<A>` and match on the variant they
//! care about:
//!
//! ```
//! use cadence_schedule::hooks::events::ScheduleEvent;
//!
//! fn report(event: &ScheduleEvent<()>) {
//!     match event {
//!         ScheduleEvent::SystemError { system, error } => {
//!             eprintln!("{} failed: {error}", system.name());
//!         }
//!         ScheduleEvent::PhaseBegan { phase } => println!("entering {phase}"),
//!         _ => {}
//!     }
//! }
//! ```

use core::fmt;

use super::schedule::{
    HookId, OnPhaseAdd, OnPhaseBegan, OnSystemAdd, OnSystemError, OnSystemRemove, OnSystemReplace,
};
use crate::phase::Phase;
use crate::system::{SystemError, SystemInfo};

/// Unified event enum for all observer hook points.
pub enum ScheduleEvent<A> {
    // ─────────────────────────────────────────────────────────────────────────
    // Registry Events
    // ─────────────────────────────────────────────────────────────────────────
    /// A system was registered.
    SystemAdd {
        /// The new system.
        system: SystemInfo<A>,
    },

    /// A system is about to be deregistered.
    SystemRemove {
        /// The system being removed.
        system: SystemInfo<A>,
    },

    /// A system's callable was swapped.
    SystemReplace {
        /// The record that was replaced.
        old: SystemInfo<A>,
        /// The record that took its place.
        new: SystemInfo<A>,
    },

    /// A system returned an error or panicked.
    SystemError {
        /// The failing system.
        system: SystemInfo<A>,
        /// What went wrong.
        error: SystemError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Phase Events
    // ─────────────────────────────────────────────────────────────────────────
    /// A phase was inserted into the ordering graph.
    PhaseAdd {
        /// The new phase.
        phase: Phase,
    },

    /// A phase pass is starting.
    PhaseBegan {
        /// The phase about to run.
        phase: Phase,
    },
}

impl<A> ScheduleEvent<A> {
    /// Returns the id of the hook point this event is delivered on.
    #[must_use]
    pub fn hook_id(&self) -> HookId {
        match self {
            Self::SystemAdd { .. } => HookId::of::<OnSystemAdd>(),
            Self::SystemRemove { .. } => HookId::of::<OnSystemRemove>(),
            Self::SystemReplace { .. } => HookId::of::<OnSystemReplace>(),
            Self::SystemError { .. } => HookId::of::<OnSystemError>(),
            Self::PhaseAdd { .. } => HookId::of::<OnPhaseAdd>(),
            Self::PhaseBegan { .. } => HookId::of::<OnPhaseBegan>(),
        }
    }

    /// Returns the hook point's marker name, e.g. `"OnSystemAdd"`.
    #[must_use]
    pub fn hook_name(&self) -> &'static str {
        match self {
            Self::SystemAdd { .. } => "OnSystemAdd",
            Self::SystemRemove { .. } => "OnSystemRemove",
            Self::SystemReplace { .. } => "OnSystemReplace",
            Self::SystemError { .. } => "OnSystemError",
            Self::PhaseAdd { .. } => "OnPhaseAdd",
            Self::PhaseBegan { .. } => "OnPhaseBegan",
        }
    }

    /// Returns the system the event is about, if any.
    ///
    /// For [`SystemReplace`](Self::SystemReplace) this is the new record.
    #[must_use]
    pub fn system(&self) -> Option<&SystemInfo<A>> {
        match self {
            Self::SystemAdd { system }
            | Self::SystemRemove { system }
            | Self::SystemError { system, .. } => Some(system),
            Self::SystemReplace { new, .. } => Some(new),
            Self::PhaseAdd { .. } | Self::PhaseBegan { .. } => None,
        }
    }
}

impl<A> Clone for ScheduleEvent<A> {
    fn clone(&self) -> Self {
        match self {
            Self::SystemAdd { system } => Self::SystemAdd {
                system: system.clone(),
            },
            Self::SystemRemove { system } => Self::SystemRemove {
                system: system.clone(),
            },
            Self::SystemReplace { old, new } => Self::SystemReplace {
                old: old.clone(),
                new: new.clone(),
            },
            Self::SystemError { system, error } => Self::SystemError {
                system: system.clone(),
                error: error.clone(),
            },
            Self::PhaseAdd { phase } => Self::PhaseAdd {
                phase: phase.clone(),
            },
            Self::PhaseBegan { phase } => Self::PhaseBegan {
                phase: phase.clone(),
            },
        }
    }
}

impl<A> fmt::Debug for ScheduleEvent<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemAdd { system } => f.debug_struct("SystemAdd").field("system", system).finish(),
            Self::SystemRemove { system } => {
                f.debug_struct("SystemRemove").field("system", system).finish()
            }
            Self::SystemReplace { old, new } => f
                .debug_struct("SystemReplace")
                .field("old", old)
                .field("new", new)
                .finish(),
            Self::SystemError { system, error } => f
                .debug_struct("SystemError")
                .field("system", system)
                .field("error", error)
                .finish(),
            Self::PhaseAdd { phase } => f.debug_struct("PhaseAdd").field("phase", phase).finish(),
            Self::PhaseBegan { phase } => f.debug_struct("PhaseBegan").field("phase", phase).finish(),
        }
    }
}
