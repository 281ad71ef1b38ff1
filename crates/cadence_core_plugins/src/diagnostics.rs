//! Per-system call statistics.
//!
//! [`DiagnosticsPlugin`] wraps every system call in a timing hook and counts
//! failures reported through `OnSystemError`. Read the numbers through the
//! [`Diagnostics`] handle the plugin hands out:
//!
//! ```
//! use cadence_core_plugins::DiagnosticsPlugin;
//! use cadence_schedule::scheduler::Scheduler;
//!
//! let plugin = DiagnosticsPlugin::new();
//! let diagnostics = plugin.diagnostics();
//!
//! let scheduler = Scheduler::new(());
//! scheduler.add_plugin(plugin).expect("diagnostics is added once");
//! let tick = scheduler.add_system(|| {}).expect("update is a default phase");
//!
//! scheduler.run_all().run_all();
//! assert_eq!(diagnostics.stats(tick).map(|stats| stats.calls), Some(2));
//! ```
//!
//! Durations are measured with the scheduler's [`Clock`], so a scheduler
//! built on a mock clock reports mock durations.

use core::time::Duration;
use std::sync::Arc;

use cadence_schedule::error::ScheduleError;
use cadence_schedule::hooks::{
    HookId, OnSystemCall, OnSystemError, OnSystemRemove, OnSystemReplace, ScheduleEvent,
};
use cadence_schedule::plugin::Plugin;
use cadence_schedule::scheduler::{Scheduler, SchedulerArgs};
use cadence_schedule::system::SystemId;
use cadence_schedule::time::Clock;
use hashbrown::HashMap;
use parking_lot::RwLock;

/// Name under which the plugin registers its hooks.
pub const DIAGNOSTICS_HOOK: &str = "cadence::diagnostics";

/// Statistics for one system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemStats {
    /// Name of the system.
    pub name: String,
    /// Completed calls, including failed ones.
    pub calls: u64,
    /// Calls that returned an error or panicked.
    pub errors: u64,
    /// Duration of the most recent call.
    pub last_duration: Duration,
    /// Sum of all call durations.
    pub total_duration: Duration,
}

impl SystemStats {
    /// Returns the mean call duration, or zero before the first call.
    #[must_use]
    pub fn mean_duration(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) => Duration::ZERO,
            Ok(calls) => self.total_duration / calls,
            Err(_) => Duration::from_secs_f64(self.total_duration.as_secs_f64() / self.calls as f64),
        }
    }
}

/// Shared view of the statistics collected by a [`DiagnosticsPlugin`].
///
/// Cloning shares the underlying table.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    systems: Arc<RwLock<HashMap<SystemId, SystemStats>>>,
}

impl Diagnostics {
    /// Returns the statistics of one system.
    #[must_use]
    pub fn stats(&self, system: impl Into<SystemId>) -> Option<SystemStats> {
        self.systems.read().get(&system.into()).cloned()
    }

    /// Returns the statistics of every system seen so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(SystemId, SystemStats)> {
        let mut rows: Vec<_> = self
            .systems
            .read()
            .iter()
            .map(|(id, stats)| (*id, stats.clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows
    }

    /// Sums error counts over all systems.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.systems.read().values().map(|stats| stats.errors).sum()
    }

    /// Forgets everything collected so far.
    pub fn reset(&self) {
        self.systems.write().clear();
    }

    fn record_call(&self, id: SystemId, name: &str, duration: Duration) {
        let mut systems = self.systems.write();
        let stats = systems.entry(id).or_insert_with(|| SystemStats {
            name: name.to_owned(),
            ..SystemStats::default()
        });
        stats.calls += 1;
        stats.last_duration = duration;
        stats.total_duration += duration;
    }

    fn record_error(&self, id: SystemId, name: &str) {
        let mut systems = self.systems.write();
        let stats = systems.entry(id).or_insert_with(|| SystemStats {
            name: name.to_owned(),
            ..SystemStats::default()
        });
        stats.errors += 1;
    }

    fn forget(&self, id: SystemId) {
        self.systems.write().remove(&id);
    }

    fn rename(&self, old: SystemId, new: SystemId, name: &str) {
        let mut systems = self.systems.write();
        if let Some(mut stats) = systems.remove(&old) {
            name.clone_into(&mut stats.name);
            systems.insert(new, stats);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DiagnosticsPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Collects [`SystemStats`] for every system the scheduler calls.
///
/// Statistics of a replaced system carry over to its replacement; those of
/// a removed system are dropped.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsPlugin {
    diagnostics: Diagnostics,
}

impl DiagnosticsPlugin {
    /// Creates the plugin with an empty statistics table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the statistics this plugin collects.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.clone()
    }
}

impl<A: SchedulerArgs> Plugin<A> for DiagnosticsPlugin {
    fn build(&self, scheduler: &Scheduler<A>) -> Result<(), ScheduleError> {
        let clock: Clock = scheduler.clock().clone();
        let calls = self.diagnostics.clone();
        let errors = self.diagnostics.clone();
        let registry = self.diagnostics.clone();

        scheduler
            .hooks()
            .register_call_hook::<OnSystemCall, _>(DIAGNOSTICS_HOOK, move |info, mut next| {
                let started = clock.now();
                next.run();
                calls.record_call(info.id(), info.name(), clock.elapsed_since(started));
            })?
            .register_observer::<OnSystemError, _>(DIAGNOSTICS_HOOK, move |_, event| {
                if let ScheduleEvent::SystemError { system, .. } = event {
                    errors.record_error(system.id(), system.name());
                }
            })?
            .register_observer::<(OnSystemRemove, OnSystemReplace), _>(
                DIAGNOSTICS_HOOK,
                move |_, event| match event {
                    ScheduleEvent::SystemRemove { system } => registry.forget(system.id()),
                    ScheduleEvent::SystemReplace { old, new } => {
                        registry.rename(old.id(), new.id(), new.name());
                    }
                    _ => {}
                },
            )?;
        Ok(())
    }

    fn cleanup(&self, scheduler: &Scheduler<A>) {
        let hooks = scheduler.hooks();
        hooks.unregister(HookId::of::<OnSystemCall>(), DIAGNOSTICS_HOOK);
        hooks.unregister(HookId::of::<OnSystemError>(), DIAGNOSTICS_HOOK);
        // Multi-point observers are registered as `name@Point`.
        for hook in [HookId::of::<OnSystemRemove>(), HookId::of::<OnSystemReplace>()] {
            hooks.unregister(hook, &format!("{DIAGNOSTICS_HOOK}@{}", hook.short_name()));
        }
    }

    fn name(&self) -> &str {
        "DiagnosticsPlugin"
    }
}
