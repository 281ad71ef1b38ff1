//! Errors returned by scheduler mutations.

use crate::event::EventError;
use crate::hooks::HookRegistrationError;
use crate::system::SystemId;

/// Errors raised synchronously by [`Scheduler`](crate::scheduler::Scheduler)
/// operations.
///
/// Every operation that returns this error leaves the scheduler exactly as
/// it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// A requested ordering edge would close a cycle in the phase graph.
    #[error("phase ordering conflict: cycle through [{}]", .cycle.join(" -> "))]
    OrderingConflict {
        /// The phases left unresolved by the cycle, in insertion order.
        cycle: Vec<String>,
    },
    /// The system handle is already registered with this scheduler.
    #[error("system '{name}' ({id}) is already registered")]
    DuplicateSystem {
        /// Id of the handle.
        id: SystemId,
        /// Name of the system.
        name: String,
    },
    /// The system is not registered with this scheduler.
    #[error("system {id} is not registered")]
    UnknownSystem {
        /// Id that was looked up.
        id: SystemId,
    },
    /// The phase was never inserted into this scheduler.
    #[error("phase '{phase}' has not been inserted")]
    UnknownPhase {
        /// Display name of the phase.
        phase: String,
    },
    /// The pipeline was never inserted into this scheduler.
    #[error("pipeline '{pipeline}' has not been inserted")]
    UnknownPipeline {
        /// Display name of the pipeline.
        pipeline: String,
    },
    /// A unique plugin was added twice.
    #[error("plugin '{name}' was already added")]
    DuplicatePlugin {
        /// Name of the plugin.
        name: String,
    },
    /// An event source refused a subscription.
    #[error(transparent)]
    Event(#[from] EventError),
    /// A hook could not be registered.
    #[error(transparent)]
    Hook(#[from] HookRegistrationError),
}
