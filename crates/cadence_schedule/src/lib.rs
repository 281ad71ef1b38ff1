//! Phase-ordered system scheduling for Cadence.
//!
//! `cadence_schedule` runs registered units of work ("systems") in a total
//! order of execution slots ("phases"):
//!
//! - [`phase`] - Phase identity tokens and the built-in phase set
//! - [`pipeline`] - Ordered bundles of phases inserted as one unit
//! - [`graph`] - The resolved phase order
//! - [`mod@system`] - Systems, handles, and the registry record
//! - [`condition`] - Run conditions gating systems, phases, and pipelines
//! - [`event`] - Event sources that trigger phases
//! - [`hooks`] - Observers and call middleware around the scheduler
//! - [`plugin`] - Reusable bundles of scheduler configuration
//! - [`scheduler`] - The scheduler itself
//!
//! # Example
//!
//! ```
//! use cadence_schedule::prelude::*;
//!
//! let scheduler = Scheduler::new(());
//! let simulate = Phase::named("Simulate");
//!
//! scheduler
//!     .insert_after(&simulate, &Phase::UPDATE)
//!     .expect("update is a default phase");
//! scheduler
//!     .add_system_in(|| println!("step"), &simulate)
//!     .expect("phase was just inserted");
//!
//! scheduler.run_all();
//! ```

/// Run conditions.
pub mod condition;

/// Errors returned by scheduler operations.
pub mod error;

/// Event sources and connections.
pub mod event;

/// The phase ordering graph.
pub mod graph;

/// Lifecycle hooks.
pub mod hooks;

/// Phases and their identities.
pub mod phase;

/// Pipelines of phases.
pub mod pipeline;

/// Plugins.
pub mod plugin;

/// The scheduler.
pub mod scheduler;

/// Systems and their registry records.
pub mod system;

/// Clocks.
pub mod time;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::condition::{
        Condition, EventReader, IsNot, OnEvent, RunOnce, Teardown, TimePassed, cleanup_condition,
        is_not, on_event, run_once, time_passed, time_passed_with_clock,
    };
    pub use crate::error::ScheduleError;
    pub use crate::event::{Connection, EventError, EventSource, Signal, SignalHub};
    pub use crate::hooks::{
        HooksAPI, Next, OnInnerSystemCall, OnOuterSystemCall, OnPhaseAdd, OnPhaseBegan,
        OnSystemAdd, OnSystemCall, OnSystemError, OnSystemRemove, OnSystemReplace, ScheduleEvent,
    };
    pub use crate::phase::{Phase, PhaseId};
    pub use crate::pipeline::{Pipeline, PipelineId};
    pub use crate::plugin::{Plugin, PluginGroup, PluginGroupBuilder};
    pub use crate::scheduler::{OrderTarget, RunTarget, Scheduler, SchedulerArgs};
    pub use crate::system::{System, SystemContext, SystemError, SystemHandle, SystemId, SystemInfo};
    pub use crate::time::{Clock, ClockProvider};
}
