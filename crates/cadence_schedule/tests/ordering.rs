//! Integration tests for phase ordering.
//!
//! Verifies that the resolved order is a valid topological order of every
//! accepted edge, that ties follow insertion, and that rejected insertions
//! leave the graph exactly as it was.


use cadence_schedule::error::ScheduleError;
use cadence_schedule::phase::Phase;
use cadence_schedule::pipeline::Pipeline;
use cadence_schedule::scheduler::Scheduler;
use proptest::prelude::*;
use test_utils::{Trace, bare_scheduler, labels, scheduler_with};

fn names(phases: &[Phase]) -> Vec<String> {
    phases
        .iter()
        .map(|phase| phase.name().unwrap_or_default().to_owned())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSERTION ORDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Bare inserts keep the order phases were added in.
#[test]
fn unconstrained_phases_follow_insertion() {
    let a = Phase::named("A");
    let b = Phase::named("B");
    let c = Phase::named("C");
    let scheduler = scheduler_with(&[&c, &a, &b]);

    assert_eq!(names(&scheduler.ordered_phases()), labels(&["C", "A", "B"]));
}

/// `insert_after` and `insert_before` pull phases next to their anchors.
#[test]
fn anchored_phases_sit_next_to_anchor() {
    let a = Phase::named("A");
    let b = Phase::named("B");
    let scheduler = scheduler_with(&[&a, &b]);

    scheduler
        .insert_after(Phase::named("AfterA"), &a)
        .expect("insert should succeed");
    scheduler
        .insert_before(Phase::named("BeforeA"), &a)
        .expect("insert should succeed");

    assert_eq!(
        names(&scheduler.ordered_phases()),
        labels(&["BeforeA", "A", "AfterA", "B"])
    );
}

/// Inserting an existing phase again is a no-op.
#[test]
fn reinserting_a_phase_is_idempotent() {
    let a = Phase::named("A");
    let scheduler = scheduler_with(&[&a, &Phase::named("B")]);
    let before = scheduler.phase_graph();

    scheduler.insert(&a).expect("insert should succeed");

    assert_eq!(scheduler.phase_graph(), before);
}

/// A self edge is an ordering conflict.
#[test]
fn phase_cannot_follow_itself() {
    let a = Phase::named("A");
    let scheduler = scheduler_with(&[&a]);

    let result = scheduler.insert_after(&a, &a);

    assert!(matches!(result, Err(ScheduleError::OrderingConflict { .. })));
}

/// The conflict error names the phases on the cycle.
#[test]
fn conflict_reports_cycle_members() {
    let a = Phase::named("A");
    let b = Phase::named("B");
    let c = Phase::named("C");
    let scheduler = bare_scheduler();
    scheduler
        .insert(&a)
        .and_then(|scheduler| scheduler.insert_after(&b, &a))
        .and_then(|scheduler| scheduler.insert_after(&c, &b))
        .expect("chain should succeed");

    let error = scheduler
        .insert_before(&c, &a)
        .expect_err("cycle should be rejected");

    let ScheduleError::OrderingConflict { cycle } = error else {
        panic!("expected an ordering conflict, got {error:?}");
    };
    assert_eq!(cycle, labels(&["C", "A", "B"]));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINES
// ═══════════════════════════════════════════════════════════════════════════════

/// Pipeline members are inserted consecutively and chained.
#[test]
fn pipeline_members_run_in_pipeline_order() {
    let trace = Trace::new();
    let input = Phase::named("Input");
    let step = Phase::named("Step");
    let render = Phase::named("Render");
    let pipeline = Pipeline::named("Frame")
        .insert(input.clone())
        .insert(render.clone())
        .insert_after(step.clone(), &input);

    let scheduler = bare_scheduler();
    scheduler.insert(&pipeline).expect("insert should succeed");
    for (phase, label) in [(&render, "Render"), (&step, "Step"), (&input, "Input")] {
        scheduler
            .add_system_in(trace.system(label), phase)
            .expect("add should succeed");
    }

    scheduler.run_all();

    assert_eq!(trace.entries(), labels(&["Input", "Step", "Render"]));
    let graph = scheduler.phase_graph();
    assert!(graph.runs_before(input.id(), step.id()));
    assert!(graph.runs_before(step.id(), render.id()));
}

/// A pipeline that contradicts existing edges is rejected as a whole.
#[test]
fn conflicting_pipeline_leaves_graph_unchanged() {
    let a = Phase::named("A");
    let b = Phase::named("B");
    let c = Phase::named("C");
    let scheduler = bare_scheduler();
    scheduler
        .insert(&a)
        .and_then(|scheduler| scheduler.insert_after(&b, &a))
        .expect("inserts should succeed");
    let before = scheduler.phase_graph();

    let backwards = Pipeline::named("Backwards")
        .insert(c.clone())
        .insert(b.clone())
        .insert(a.clone());
    let result = scheduler.insert(&backwards);

    assert!(matches!(result, Err(ScheduleError::OrderingConflict { .. })));
    assert_eq!(scheduler.phase_graph(), before);
    assert!(!scheduler.contains_phase(&c));
    assert!(!scheduler.contains_pipeline(&backwards));
}

/// Later edits to a pipeline value only apply once it is inserted again.
#[test]
fn pipeline_edits_apply_on_reinsertion() {
    let a = Phase::named("A");
    let b = Phase::named("B");
    let pipeline = Pipeline::named("Grow").insert(a.clone());
    let scheduler = bare_scheduler();
    scheduler.insert(&pipeline).expect("insert should succeed");

    let grown = pipeline.insert(b.clone());
    assert!(!scheduler.contains_phase(&b));

    scheduler.insert(&grown).expect("reinsert should succeed");
    assert!(scheduler.phase_graph().runs_before(a.id(), b.id()));
}

/// A pipeline placed after another starts after the anchor's last member.
#[test]
fn pipeline_after_pipeline() {
    let scheduler = Scheduler::new(());
    let cleanup = Pipeline::named("Cleanup")
        .insert(Phase::named("Flush"))
        .insert(Phase::named("Close"));

    scheduler
        .insert_after(&cleanup, Pipeline::main())
        .expect("insert should succeed");

    let order = names(&scheduler.ordered_phases());
    assert_eq!(order[order.len() - 3..], labels(&["Last", "Flush", "Close"]));
}

/// Anchoring on something that was never inserted fails.
#[test]
fn unknown_anchor_is_rejected() {
    let scheduler = bare_scheduler();

    assert!(matches!(
        scheduler.insert_after(Phase::named("A"), Phase::named("Ghost")),
        Err(ScheduleError::UnknownPhase { .. })
    ));
    assert!(matches!(
        scheduler.insert_before(Phase::named("A"), Pipeline::named("Ghost")),
        Err(ScheduleError::UnknownPipeline { .. })
    ));
    assert!(scheduler.ordered_phases().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

proptest! {
    /// Every accepted edge is respected by the resolved order, and every
    /// rejected edge leaves the graph untouched.
    #[test]
    fn resolved_order_respects_accepted_edges(
        count in 2_usize..8,
        edges in proptest::collection::vec((0_usize..8, 0_usize..8), 0..24),
    ) {
        let phases: Vec<Phase> = (0..count).map(|index| Phase::named(format!("P{index}"))).collect();
        let scheduler = bare_scheduler();
        for phase in &phases {
            scheduler.insert(phase).expect("insert should succeed");
        }

        let mut accepted = Vec::new();
        for (from, to) in edges {
            let (from, to) = (from % count, to % count);
            let before = scheduler.phase_graph();
            match scheduler.insert_after(&phases[to], &phases[from]) {
                Ok(_) => accepted.push((from, to)),
                Err(ScheduleError::OrderingConflict { .. }) => {
                    prop_assert_eq!(scheduler.phase_graph(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }

        let graph = scheduler.phase_graph();
        prop_assert_eq!(graph.ordered().len(), count);
        for (from, to) in accepted {
            prop_assert!(graph.runs_before(phases[from].id(), phases[to].id()));
        }
    }
}
