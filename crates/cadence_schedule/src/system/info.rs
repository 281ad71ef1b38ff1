use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::phase::Phase;
use crate::scheduler::{Scheduler, SchedulerArgs};
use crate::system::{SystemError, SystemHandle, SystemId};

struct SystemRecord<A> {
    handle: SystemHandle<A>,
    phase: Mutex<Phase>,
    logs: Arc<Mutex<Vec<String>>>,
}

/// The scheduler's record of a registered system.
///
/// Cloning is cheap and every clone observes the same record, so hooks can
/// hold on to an info and still read the system's current phase and logs.
pub struct SystemInfo<A> {
    record: Arc<SystemRecord<A>>,
}

impl<A> SystemInfo<A> {
    pub(crate) fn new(handle: SystemHandle<A>, phase: Phase) -> Self {
        Self {
            record: Arc::new(SystemRecord {
                handle,
                phase: Mutex::new(phase),
                logs: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    /// Builds the record for `handle` taking over this system's slot.
    ///
    /// The phase is copied and the log buffer is shared.
    pub(crate) fn replaced_by(&self, handle: SystemHandle<A>) -> Self {
        Self {
            record: Arc::new(SystemRecord {
                handle,
                phase: Mutex::new(self.phase()),
                logs: Arc::clone(&self.record.logs),
            }),
        }
    }

    /// Returns the system's identity.
    #[must_use]
    pub fn id(&self) -> SystemId {
        self.record.handle.id()
    }

    /// Returns the system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.record.handle.name()
    }

    /// Returns the handle the system was registered with.
    #[must_use]
    pub fn handle(&self) -> &SystemHandle<A> {
        &self.record.handle
    }

    /// Returns the phase the system currently belongs to.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.record.phase.lock().clone()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        *self.record.phase.lock() = phase;
    }

    /// Returns a copy of the system's log lines, oldest first.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.record.logs.lock().clone()
    }

    /// Appends a line to the system's log.
    pub fn log(&self, message: impl Into<String>) {
        self.record.logs.lock().push(message.into());
    }

    pub(crate) fn invoke(&self, ctx: &SystemContext<A>) -> Result<(), SystemError> {
        self.record.handle.system().run(ctx)
    }
}

impl<A> Clone for SystemInfo<A> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl<A> From<&SystemInfo<A>> for SystemId {
    fn from(info: &SystemInfo<A>) -> Self {
        info.id()
    }
}

impl<A> fmt::Debug for SystemInfo<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemInfo")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// What a running system can see.
///
/// Passed to systems that take a context argument. It owns a scheduler
/// handle, so a system may register, remove, or run other systems while it
/// executes.
pub struct SystemContext<A> {
    scheduler: Scheduler<A>,
    info: SystemInfo<A>,
}

impl<A: SchedulerArgs> SystemContext<A> {
    pub(crate) fn new(scheduler: Scheduler<A>, info: SystemInfo<A>) -> Self {
        Self { scheduler, info }
    }

    /// Returns the scheduler running this system.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<A> {
        &self.scheduler
    }

    /// Returns the scheduler's shared arguments.
    #[must_use]
    pub fn args(&self) -> &A {
        self.scheduler.args()
    }

    /// Returns the running system's record.
    #[must_use]
    pub fn info(&self) -> &SystemInfo<A> {
        &self.info
    }

    /// Returns the running system's identity.
    #[must_use]
    pub fn system_id(&self) -> SystemId {
        self.info.id()
    }

    /// Returns the phase the running system belongs to.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.info.phase()
    }

    /// Returns the time between the last two `run_all` passes.
    #[must_use]
    pub fn delta_time(&self) -> Duration {
        self.scheduler.delta_time()
    }

    /// Appends a line to the running system's log.
    pub fn log(&self, message: impl Into<String>) {
        self.info.log(message);
    }
}
