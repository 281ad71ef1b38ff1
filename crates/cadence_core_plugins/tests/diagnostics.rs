//! Integration tests for `DiagnosticsPlugin` driven by a real scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_core_plugins::{DIAGNOSTICS_HOOK, DefaultPlugins, DiagnosticsPlugin};
use cadence_schedule::hooks::{HookId, OnSystemCall};
use cadence_schedule::plugin::PluginGroup;
use cadence_schedule::scheduler::Scheduler;
use cadence_schedule::system::{SystemError, SystemHandle};
use cadence_schedule::time::MockClock;

fn scheduler_on(clock: &Arc<MockClock>) -> Scheduler<()> {
    Scheduler::builder(()).with_clock(clock.clone()).build()
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALL STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Calls and durations come from the scheduler's clock.
#[test]
fn calls_are_timed_with_scheduler_clock() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let scheduler = scheduler_on(&clock);
    let plugin = DiagnosticsPlugin::new();
    let diagnostics = plugin.diagnostics();
    scheduler.add_plugin(plugin).expect("plugin should build");

    let ticking = Arc::clone(&clock);
    let system = scheduler
        .add_system(SystemHandle::new(move || ticking.advance(Duration::from_millis(5))).with_name("step"))
        .expect("add should succeed");

    scheduler.run_all().run_all().run_all();

    let stats = diagnostics.stats(system).expect("stats should exist");
    assert_eq!(stats.name, "step");
    assert_eq!(stats.calls, 3);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.last_duration, Duration::from_millis(5));
    assert_eq!(stats.total_duration, Duration::from_millis(15));
    assert_eq!(stats.mean_duration(), Duration::from_millis(5));
}

/// Failures and panics are counted as errors and as calls.
#[test]
fn failures_are_counted() {
    let scheduler = Scheduler::new(());
    let plugin = DiagnosticsPlugin::new();
    let diagnostics = plugin.diagnostics();
    scheduler.add_plugin(plugin).expect("plugin should build");

    let failing = scheduler
        .add_system(|| -> Result<(), SystemError> { Err(SystemError::failed("nope")) })
        .expect("add should succeed");
    let panicking = scheduler
        .add_system(|| -> Result<(), SystemError> { panic!("boom") })
        .expect("add should succeed");

    scheduler.run_all().run_all();

    let failing = diagnostics.stats(failing).expect("stats should exist");
    let panicking = diagnostics.stats(panicking).expect("stats should exist");
    assert_eq!((failing.calls, failing.errors), (2, 2));
    assert_eq!((panicking.calls, panicking.errors), (2, 2));
    assert_eq!(diagnostics.total_errors(), 4);
}

/// Gated systems are not counted.
#[test]
fn skipped_calls_are_not_counted() {
    let scheduler = Scheduler::new(());
    let plugin = DiagnosticsPlugin::new();
    let diagnostics = plugin.diagnostics();
    scheduler.add_plugin(plugin).expect("plugin should build");
    let system = scheduler.add_system(|| {}).expect("add should succeed");
    scheduler
        .add_run_condition(system, || false)
        .expect("condition should attach");

    scheduler.run_all();

    assert!(diagnostics.stats(system).is_none());
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY CHANGES
// ═══════════════════════════════════════════════════════════════════════════════

/// Replacement carries statistics over; removal drops them.
#[test]
fn stats_follow_registry_changes() {
    let scheduler = Scheduler::new(());
    let plugin = DiagnosticsPlugin::new();
    let diagnostics = plugin.diagnostics();
    scheduler.add_plugin(plugin).expect("plugin should build");
    let old = scheduler
        .add_system(SystemHandle::new(|| {}).with_name("old"))
        .expect("add should succeed");
    scheduler.run_all();

    let new = scheduler
        .replace_system(old, SystemHandle::new(|| {}).with_name("new"))
        .expect("replace should succeed");
    scheduler.run_all();

    assert!(diagnostics.stats(old).is_none());
    let stats = diagnostics.stats(new).expect("stats should carry over");
    assert_eq!(stats.name, "new");
    assert_eq!(stats.calls, 2);

    scheduler.remove_system(new).expect("remove should succeed");
    assert!(diagnostics.snapshot().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// GROUPS AND CLEANUP
// ═══════════════════════════════════════════════════════════════════════════════

/// The default group installs both plugins and cleanup removes their hooks.
#[test]
fn default_plugins_install_and_clean_up() {
    let scheduler = Scheduler::new(());
    scheduler
        .add_plugins(DefaultPlugins.build())
        .expect("group should build");
    let hooks = scheduler.hooks();
    assert!(hooks.contains_hook(HookId::of::<OnSystemCall>(), DIAGNOSTICS_HOOK));

    scheduler.cleanup();

    assert_eq!(hooks.hook_count(HookId::of::<OnSystemCall>()), 0);
}

/// A caller-owned diagnostics plugin can replace the group's own.
#[test]
fn group_diagnostics_can_be_swapped() {
    let plugin = DiagnosticsPlugin::new();
    let diagnostics = plugin.diagnostics();
    let scheduler = Scheduler::new(());
    scheduler
        .add_plugins(
            DefaultPlugins
                .build()
                .disable::<DiagnosticsPlugin>()
                .add(plugin),
        )
        .expect("group should build");
    let system = scheduler.add_system(|| {}).expect("add should succeed");

    scheduler.run_all();

    assert_eq!(diagnostics.stats(system).map(|stats| stats.calls), Some(1));
}
