//! Integration tests for the system registry and the run loop.
//!
//! Covers registration, removal, replacement, and phase moves, including
//! mutations made by systems while their own phase is running.


use cadence_schedule::condition::run_once;
use cadence_schedule::error::ScheduleError;
use cadence_schedule::hooks::{OnSystemError, OnSystemRemove, OnSystemReplace, ScheduleEvent};
use cadence_schedule::phase::Phase;
use cadence_schedule::pipeline::Pipeline;
use cadence_schedule::scheduler::Scheduler;
use cadence_schedule::system::{SystemContext, SystemError, SystemHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use test_utils::{Counter, Trace, bare_scheduler, labels, scheduler_with};

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRATION
// ═══════════════════════════════════════════════════════════════════════════════

/// `add_system` uses the default phase, `Phase::UPDATE`.
#[test]
fn add_system_defaults_to_update() {
    let scheduler = Scheduler::new(());
    let id = scheduler.add_system(|| {}).expect("add should succeed");

    let info = scheduler.system_info(id).expect("system should be registered");
    assert_eq!(info.phase(), Phase::UPDATE);
    assert_eq!(scheduler.systems_in(&Phase::UPDATE).len(), 1);
}

/// Plain functions get a fresh identity on every registration.
#[test]
fn functions_can_be_added_twice() {
    fn tick() {}

    let scheduler = Scheduler::new(());
    let first = scheduler.add_system(tick).expect("add should succeed");
    let second = scheduler.add_system(tick).expect("add should succeed");

    assert_ne!(first, second);
    assert_eq!(scheduler.system_count(), 2);
}

/// Re-adding the same handle is rejected without side effects.
#[test]
fn duplicate_handle_is_rejected() {
    let scheduler = Scheduler::new(());
    let handle = SystemHandle::new(|| {}).with_name("tick");

    scheduler.add_system(&handle).expect("first add should succeed");
    let result = scheduler.add_system_in(&handle, &Phase::LAST);

    assert_eq!(
        result,
        Err(ScheduleError::DuplicateSystem {
            id: handle.id(),
            name: "tick".to_owned(),
        })
    );
    assert!(scheduler.systems_in(&Phase::LAST).is_empty());
}

/// Adding to a phase that was never inserted fails.
#[test]
fn unknown_phase_is_rejected() {
    let scheduler = bare_scheduler();
    let result = scheduler.add_system(|| {});

    assert!(matches!(result, Err(ScheduleError::UnknownPhase { .. })));
    assert_eq!(scheduler.system_count(), 0);
}

/// `add_systems` registers nothing if any entry is a duplicate.
#[test]
fn add_systems_is_all_or_nothing() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());
    let a = trace.system("a");
    let b = trace.system("b");

    let result = scheduler.add_systems([a.clone(), b.clone(), a.clone()]);
    assert!(matches!(result, Err(ScheduleError::DuplicateSystem { .. })));
    assert_eq!(scheduler.system_count(), 0);

    scheduler.add_system(&b).expect("add should succeed");
    let result = scheduler.add_systems([a.clone(), b.clone()]);
    assert!(matches!(result, Err(ScheduleError::DuplicateSystem { .. })));
    assert!(!scheduler.contains_system(&a));

    let ids = scheduler
        .add_systems_in([a.clone(), trace.system("c")], &Phase::LAST)
        .expect("batch should succeed");
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0], a.id());
}

// ═══════════════════════════════════════════════════════════════════════════════
// RUN ORDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Systems run phase by phase, in registration order within a phase.
#[test]
fn run_all_follows_phase_then_registration_order() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());

    scheduler
        .add_system_in(trace.system("last"), &Phase::LAST)
        .expect("add should succeed");
    scheduler
        .add_system(trace.system("update-1"))
        .expect("add should succeed");
    scheduler
        .add_system_in(trace.system("first"), &Phase::FIRST)
        .expect("add should succeed");
    scheduler
        .add_system(trace.system("update-2"))
        .expect("add should succeed");
    scheduler
        .add_system_in(trace.system("startup"), &Phase::STARTUP)
        .expect("add should succeed");

    scheduler.run_all();

    assert_eq!(
        trace.entries(),
        labels(&["startup", "first", "update-1", "update-2", "last"])
    );
}

/// Systems receive the scheduler arguments through their context.
#[test]
fn systems_see_scheduler_args() {
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let scheduler = Scheduler::new(42_u32);

    scheduler
        .add_system(move |ctx: &SystemContext<u32>| {
            *sink.lock() = Some((*ctx.args(), ctx.phase()));
        })
        .expect("add should succeed");
    scheduler.run_all();

    assert_eq!(*seen.lock(), Some((42, Phase::UPDATE)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURE ISOLATION
// ═══════════════════════════════════════════════════════════════════════════════

/// A failing system is logged and reported; its siblings still run.
#[test]
fn failing_system_does_not_stop_the_pass() {
    let trace = Trace::new();
    let phase = Phase::named("Work");
    let scheduler = scheduler_with(&[&phase]);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);

    scheduler
        .hooks()
        .register_observer::<OnSystemError, _>("collect", move |_, event| {
            if let ScheduleEvent::SystemError { system, error } = event {
                sink.lock().push((system.name().to_owned(), error.clone()));
            }
        })
        .expect("registration should succeed");

    let failing = trace.failing_system("b");
    scheduler
        .add_systems_in([trace.system("a"), failing.clone(), trace.system("c")], &phase)
        .expect("batch should succeed");

    scheduler.run_all();

    assert_eq!(trace.entries(), labels(&["a", "b", "c"]));
    assert_eq!(
        *errors.lock(),
        vec![("b".to_owned(), SystemError::failed("b failed"))]
    );
    let info = scheduler
        .system_info(&failing)
        .expect("system should be registered");
    assert_eq!(info.logs(), vec!["b failed"]);
}

/// A panicking system is caught and reported as `Panicked`.
#[test]
fn panicking_system_is_contained() {
    let trace = Trace::new();
    let phase = Phase::named("Work");
    let scheduler = scheduler_with(&[&phase]);
    let panicking = trace.panicking_system("boom");

    scheduler
        .add_systems_in([panicking.clone(), trace.system("after")], &phase)
        .expect("batch should succeed");
    scheduler.run_all();

    assert_eq!(trace.entries(), labels(&["boom", "after"]));
    let info = scheduler
        .system_info(&panicking)
        .expect("system should be registered");
    assert_eq!(info.logs(), vec!["system panicked: boom panicked"]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// REMOVAL
// ═══════════════════════════════════════════════════════════════════════════════

/// `SystemRemove` observers still see the system registered.
#[test]
fn remove_fires_before_deregistration() {
    let scheduler = Scheduler::new(());
    let registered_during_hook = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&registered_during_hook);

    scheduler
        .hooks()
        .register_observer::<OnSystemRemove, _>("check", move |scheduler, event| {
            if let Some(system) = event.system() {
                *sink.lock() = Some(scheduler.contains_system(system));
            }
        })
        .expect("registration should succeed");

    let id = scheduler.add_system(|| {}).expect("add should succeed");
    scheduler.remove_system(id).expect("remove should succeed");

    assert_eq!(*registered_during_hook.lock(), Some(true));
    assert!(!scheduler.contains_system(id));
    assert_eq!(
        scheduler.remove_system(id).err(),
        Some(ScheduleError::UnknownSystem { id })
    );
}

/// A system that removes itself runs at most once.
#[test]
fn self_removing_system_runs_once() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());

    scheduler
        .add_system(trace.self_removing_system("once"))
        .expect("add should succeed");
    scheduler
        .add_system(trace.system("steady"))
        .expect("add should succeed");

    scheduler.run_all().run_all().run_all();

    assert_eq!(trace.count("once"), 1);
    assert_eq!(trace.count("steady"), 3);
}

/// Removing a later sibling mid-pass does not skip it in the current pass.
#[test]
fn removal_mid_pass_takes_effect_next_pass() {
    let trace = Trace::new();
    let phase = Phase::named("Work");
    let scheduler = scheduler_with(&[&phase]);
    let victim = trace.system("victim");

    let remover = {
        let trace = trace.clone();
        let victim = victim.clone();
        SystemHandle::new(move |ctx: &SystemContext<()>| {
            trace.record("remover");
            if ctx.scheduler().contains_system(&victim) {
                ctx.scheduler().remove_system(&victim).map(|_| ())
            } else {
                Ok(())
            }
        })
    };

    scheduler
        .add_systems_in([remover, victim], &phase)
        .expect("batch should succeed");

    scheduler.run_all();
    assert_eq!(trace.entries(), labels(&["remover", "victim"]));

    trace.clear();
    scheduler.run_all();
    assert_eq!(trace.entries(), labels(&["remover"]));
}

/// A gated sibling removed mid-pass keeps its gate for the rest of the pass.
#[test]
fn removed_gated_system_stays_gated_mid_pass() {
    let trace = Trace::new();
    let phase = Phase::named("Work");
    let scheduler = scheduler_with(&[&phase]);
    let victim = trace.system("victim");

    let remover = {
        let trace = trace.clone();
        let victim = victim.clone();
        SystemHandle::new(move |ctx: &SystemContext<()>| {
            trace.record("remover");
            ctx.scheduler().remove_system(&victim).map(|_| ())
        })
    };
    scheduler
        .add_systems_in([remover, victim.clone()], &phase)
        .expect("batch should succeed");
    scheduler
        .add_run_condition(&victim, || false)
        .expect("condition should be set");

    scheduler.run_all();

    assert_eq!(trace.entries(), labels(&["remover"]));
    assert!(!scheduler.contains_system(&victim));
}

/// A gated sibling replaced mid-pass keeps its gate in the current pass, and
/// the replacement inherits it from the next pass on.
#[test]
fn replaced_gated_system_stays_gated_mid_pass() {
    let trace = Trace::new();
    let phase = Phase::named("Work");
    let scheduler = scheduler_with(&[&phase]);
    let victim = trace.system("victim");
    let successor = trace.system("successor");

    let replacer = {
        let trace = trace.clone();
        let victim = victim.clone();
        let successor = successor.clone();
        SystemHandle::new(move |ctx: &SystemContext<()>| {
            trace.record("replacer");
            if !ctx.scheduler().contains_system(&victim) {
                return Ok(());
            }
            ctx.scheduler()
                .replace_system(&victim, &successor)
                .map(|_| ())
        })
    };
    scheduler
        .add_systems_in([replacer, victim.clone()], &phase)
        .expect("batch should succeed");
    scheduler
        .add_run_condition(&victim, || false)
        .expect("condition should be set");

    scheduler.run_all();
    assert_eq!(trace.entries(), labels(&["replacer"]));

    scheduler.run_all();
    assert_eq!(trace.entries(), labels(&["replacer", "replacer"]));
    assert!(scheduler.contains_system(&successor));
}

/// A consumed `run_once` gate is not bypassed by a mid-pass removal.
#[test]
fn removed_run_once_system_is_not_rerun() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());
    let victim = trace.system("victim");

    let remover = {
        let trace = trace.clone();
        let victim = victim.clone();
        SystemHandle::new(move |ctx: &SystemContext<()>| {
            trace.record("remover");
            if ctx.scheduler().contains_system(&victim) && trace.count("remover") > 1 {
                ctx.scheduler().remove_system(&victim)?;
            }
            Ok::<(), ScheduleError>(())
        })
    };
    scheduler
        .add_systems([remover, victim.clone()])
        .expect("batch should succeed");
    scheduler
        .add_run_condition(&victim, run_once())
        .expect("condition should be set");

    scheduler.run_all().run_all();

    assert_eq!(trace.count("victim"), 1);
    assert_eq!(trace.count("remover"), 2);
}

/// A system that moves itself into a later phase runs once per pass.
#[test]
fn system_moved_to_later_phase_runs_once_per_pass() {
    let trace = Trace::new();
    let work = Phase::named("Work");
    let late = Phase::named("Late");
    let scheduler = scheduler_with(&[&work, &late]);

    let mover = {
        let trace = trace.clone();
        let late = late.clone();
        SystemHandle::new(move |ctx: &SystemContext<()>| {
            trace.record("mover");
            if ctx.phase() == late {
                return Ok(());
            }
            ctx.scheduler().edit_system(ctx.system_id(), &late).map(|_| ())
        })
    };
    let id = scheduler
        .add_system_in(mover, &work)
        .expect("add should succeed");

    scheduler.run_all();
    assert_eq!(trace.count("mover"), 1);
    assert_eq!(scheduler.system_info(id).map(|info| info.phase()), Some(late));

    scheduler.run_all();
    assert_eq!(trace.count("mover"), 2);
}

/// A system added mid-pass to the running phase starts on the next pass.
#[test]
fn addition_mid_pass_takes_effect_next_pass() {
    let trace = Trace::new();
    let phase = Phase::named("Work");
    let scheduler = scheduler_with(&[&phase]);
    let late = trace.system("late");

    let spawner = {
        let trace = trace.clone();
        let phase = phase.clone();
        SystemHandle::new(move |ctx: &SystemContext<()>| {
            trace.record("spawner");
            if ctx.scheduler().contains_system(&late) {
                return Ok(());
            }
            ctx.scheduler().add_system_in(&late, &phase).map(|_| ())
        })
    };
    scheduler
        .add_system_in(spawner, &phase)
        .expect("add should succeed");

    scheduler.run_all();
    assert_eq!(trace.entries(), labels(&["spawner"]));

    scheduler.run_all();
    assert_eq!(trace.entries(), labels(&["spawner", "spawner", "late"]));
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPLACEMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// The replacement takes over the phase and position; the old id is gone.
#[test]
fn replace_preserves_phase_and_position() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());
    let old = trace.system("old");

    scheduler
        .add_systems_in([trace.system("before"), old.clone(), trace.system("after")], &Phase::LAST)
        .expect("batch should succeed");
    let new = scheduler
        .replace_system(&old, trace.system("new"))
        .expect("replace should succeed");

    assert_eq!(
        scheduler.system_info(new).map(|info| info.phase()),
        Some(Phase::LAST)
    );
    scheduler.run(new).expect("new system should run");
    assert_eq!(
        scheduler.run(&old).err(),
        Some(ScheduleError::UnknownSystem { id: old.id() })
    );

    trace.clear();
    scheduler.run(&Phase::LAST).expect("phase should run");
    assert_eq!(trace.entries(), labels(&["before", "new", "after"]));
}

/// Replacement keeps the log history and the run condition.
#[test]
fn replace_keeps_logs_and_condition() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());
    let old = trace.failing_system("flaky");

    scheduler.add_system(&old).expect("add should succeed");
    scheduler.run_all();
    scheduler
        .add_run_condition(&old, || false)
        .expect("condition should be set");

    let new = scheduler
        .replace_system(&old, trace.system("fixed"))
        .expect("replace should succeed");
    scheduler.run_all();

    let info = scheduler.system_info(new).expect("system should be registered");
    assert_eq!(info.logs(), vec!["flaky failed"]);
    assert_eq!(trace.count("fixed"), 0);
}

/// `SystemReplace` carries both records.
#[test]
fn replace_notifies_with_old_and_new() {
    let scheduler = Scheduler::new(());
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);

    scheduler
        .hooks()
        .register_observer::<OnSystemReplace, _>("record", move |_, event| {
            if let ScheduleEvent::SystemReplace { old, new } = event {
                *sink.lock() = Some((old.id(), new.id()));
            }
        })
        .expect("registration should succeed");

    let old = SystemHandle::new(|| {});
    let new = SystemHandle::new(|| {});
    scheduler.add_system(&old).expect("add should succeed");
    scheduler
        .replace_system(&old, &new)
        .expect("replace should succeed");

    assert_eq!(*seen.lock(), Some((old.id(), new.id())));
}

/// Replacement rejects unknown originals and already-registered successors.
#[test]
fn replace_validates_both_sides() {
    let scheduler = Scheduler::new(());
    let a = SystemHandle::new(|| {});
    let b = SystemHandle::new(|| {});

    assert_eq!(
        scheduler.replace_system(&a, &b).err(),
        Some(ScheduleError::UnknownSystem { id: a.id() })
    );

    scheduler
        .add_systems([a.clone(), b.clone()])
        .expect("batch should succeed");
    assert!(matches!(
        scheduler.replace_system(&a, &b),
        Err(ScheduleError::DuplicateSystem { .. })
    ));
    assert_eq!(
        scheduler.replace_system(&a, &a).expect("self replace is a no-op"),
        a.id()
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// EDITING
// ═══════════════════════════════════════════════════════════════════════════════

/// `edit_system` moves a system to the end of another phase.
#[test]
fn edit_moves_system_to_end_of_phase() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());
    let mover = trace.system("mover");

    scheduler.add_system(&mover).expect("add should succeed");
    scheduler
        .add_system_in(trace.system("resident"), &Phase::LAST)
        .expect("add should succeed");
    scheduler
        .edit_system(&mover, &Phase::LAST)
        .expect("edit should succeed");

    assert!(scheduler.systems_in(&Phase::UPDATE).is_empty());
    let names: Vec<String> = scheduler
        .systems_in(&Phase::LAST)
        .iter()
        .map(|info| info.name().to_owned())
        .collect();
    assert_eq!(names, labels(&["resident", "mover"]));

    let result = scheduler.edit_system(&mover, &Phase::named("Nowhere"));
    assert!(matches!(result, Err(ScheduleError::UnknownPhase { .. })));
}

// ═══════════════════════════════════════════════════════════════════════════════
// TARGETED RUNS
// ═══════════════════════════════════════════════════════════════════════════════

/// `run` reports unregistered targets.
#[test]
fn run_rejects_unknown_targets() {
    let scheduler = Scheduler::new(());
    let stray = SystemHandle::<()>::new(|| {});

    assert!(matches!(
        scheduler.run(&stray),
        Err(ScheduleError::UnknownSystem { .. })
    ));
    assert!(matches!(
        scheduler.run(Phase::named("Nowhere")),
        Err(ScheduleError::UnknownPhase { .. })
    ));
    assert!(matches!(
        scheduler.run(Pipeline::named("Nowhere")),
        Err(ScheduleError::UnknownPipeline { .. })
    ));
}

/// Running a pipeline runs its member phases in resolved order.
#[test]
fn run_pipeline_runs_members_in_order() {
    let trace = Trace::new();
    let scheduler = Scheduler::new(());

    scheduler
        .add_system_in(trace.system("post"), &Phase::POST_UPDATE)
        .expect("add should succeed");
    scheduler
        .add_system_in(trace.system("pre"), &Phase::PRE_UPDATE)
        .expect("add should succeed");
    scheduler
        .add_system_in(trace.system("startup"), &Phase::STARTUP)
        .expect("add should succeed");

    scheduler
        .run(Pipeline::main())
        .expect("pipeline should run");

    assert_eq!(trace.entries(), labels(&["pre", "post"]));
}

/// A single system can be run directly, outside any pass.
#[test]
fn run_system_directly() {
    let counter = Counter::new();
    let scheduler = Scheduler::new(());
    let handle = counter.system();

    scheduler.add_system(&handle).expect("add should succeed");
    scheduler
        .run(&handle)
        .and_then(|scheduler| scheduler.run(&handle))
        .expect("runs should succeed");

    assert_eq!(counter.get(), 2);
}
