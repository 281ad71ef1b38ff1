//! The scheduler: phase ordering, system registry, and the run loop.
//!
//! A [`Scheduler`] owns one [`PhaseGraph`], the systems registered against
//! its phases, their run conditions, event bindings, hooks, and plugins.
//! It is a cheap-to-clone handle; every clone drives the same state.
//!
//! # Triggering
//!
//! - [`Scheduler::run_all`] runs every phase in resolved order, skipping
//!   phases bound to an event source.
//! - [`Scheduler::run`] runs one system, phase, or pipeline immediately.
//!   Event bindings use this path when their source fires.
//!
//! # Re-entrancy
//!
//! No internal lock is held while user code runs. Systems, hooks,
//! conditions, and plugin builds may call any method on the scheduler,
//! including mutations of the phase that is currently running. A phase pass
//! iterates a snapshot taken when its systems are about to run: a system
//! removed or replaced mid-pass still runs once in that pass and is gone
//! from the next one.
//!
//! # Example
//!
//! ```
//! use cadence_schedule::phase::Phase;
//! use cadence_schedule::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(());
//! scheduler
//!     .add_system_in(|| println!("hello"), &Phase::STARTUP)
//!     .expect("startup phase is inserted by default");
//!
//! scheduler.run_all();
//! ```

use core::fmt;
use core::time::Duration;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Instant;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::condition::{BoxedCondition, Condition, cleanup_condition, run_once};
use crate::error::ScheduleError;
use crate::event::{Connection, EventCallback, EventSource};
use crate::graph::PhaseGraph;
use crate::hooks::{
    HookId, HooksAPI, OnInnerSystemCall, OnOuterSystemCall, OnSystemCall, ScheduleEvent,
};
use crate::phase::{Phase, PhaseId};
use crate::pipeline::{Pipeline, PipelineId};
use crate::plugin::{Plugin, PluginId, Plugins, SharedPlugin};
use crate::system::{
    IntoSystemHandle, SystemContext, SystemError, SystemHandle, SystemId, SystemInfo,
    panic_message,
};
use crate::time::{Clock, ClockProvider};

/// Bounds required of the value shared with every system.
///
/// Blanket-implemented; use `()` when systems need no shared state.
pub trait SchedulerArgs: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> SchedulerArgs for T {}

// ─────────────────────────────────────────────────────────────────────────────
// Targets
// ─────────────────────────────────────────────────────────────────────────────

/// Something that can be run or gated: a system, a phase, or a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// A registered system.
    System(SystemId),
    /// An inserted phase.
    Phase(Phase),
    /// An inserted pipeline, as recorded at its last insertion.
    Pipeline(Pipeline),
}

/// Target of [`Scheduler::set_run_condition`].
pub type ConditionTarget = RunTarget;

impl fmt::Display for RunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(id) => write!(f, "{id}"),
            Self::Phase(phase) => write!(f, "{phase}"),
            Self::Pipeline(pipeline) => write!(f, "{pipeline}"),
        }
    }
}

impl From<SystemId> for RunTarget {
    fn from(id: SystemId) -> Self {
        Self::System(id)
    }
}

impl<A> From<&SystemHandle<A>> for RunTarget {
    fn from(handle: &SystemHandle<A>) -> Self {
        Self::System(handle.id())
    }
}

impl<A> From<&SystemInfo<A>> for RunTarget {
    fn from(info: &SystemInfo<A>) -> Self {
        Self::System(info.id())
    }
}

impl From<Phase> for RunTarget {
    fn from(phase: Phase) -> Self {
        Self::Phase(phase)
    }
}

impl From<&Phase> for RunTarget {
    fn from(phase: &Phase) -> Self {
        Self::Phase(phase.clone())
    }
}

impl From<Pipeline> for RunTarget {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipeline(pipeline)
    }
}

impl From<&Pipeline> for RunTarget {
    fn from(pipeline: &Pipeline) -> Self {
        Self::Pipeline(pipeline.clone())
    }
}

impl From<OrderTarget> for RunTarget {
    fn from(target: OrderTarget) -> Self {
        match target {
            OrderTarget::Phase(phase) => Self::Phase(phase),
            OrderTarget::Pipeline(pipeline) => Self::Pipeline(pipeline),
        }
    }
}

/// Something that has a place in the phase order: a phase or a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTarget {
    /// A single phase.
    Phase(Phase),
    /// Every member of a pipeline, consecutively.
    Pipeline(Pipeline),
}

impl fmt::Display for OrderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase(phase) => write!(f, "{phase}"),
            Self::Pipeline(pipeline) => write!(f, "{pipeline}"),
        }
    }
}

impl From<Phase> for OrderTarget {
    fn from(phase: Phase) -> Self {
        Self::Phase(phase)
    }
}

impl From<&Phase> for OrderTarget {
    fn from(phase: &Phase) -> Self {
        Self::Phase(phase.clone())
    }
}

impl From<Pipeline> for OrderTarget {
    fn from(pipeline: Pipeline) -> Self {
        Self::Pipeline(pipeline)
    }
}

impl From<&Pipeline> for OrderTarget {
    fn from(pipeline: &Pipeline) -> Self {
        Self::Pipeline(pipeline.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal State
// ─────────────────────────────────────────────────────────────────────────────

type SharedCondition = Arc<Mutex<BoxedCondition>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TargetKey {
    System(SystemId),
    Phase(PhaseId),
    Pipeline(PipelineId),
}

impl From<&OrderTarget> for TargetKey {
    fn from(target: &OrderTarget) -> Self {
        match target {
            OrderTarget::Phase(phase) => Self::Phase(phase.id()),
            OrderTarget::Pipeline(pipeline) => Self::Pipeline(pipeline.id()),
        }
    }
}

struct EventBinding {
    event: Option<String>,
    // Disconnects on drop.
    _connection: Connection,
}

enum Placement {
    Append,
    After(OrderTarget),
    Before(OrderTarget),
}

struct ScheduleState<A> {
    graph: PhaseGraph,
    /// Member lists as of each pipeline's last insertion, in insertion order.
    pipelines: Vec<Pipeline>,
    systems: HashMap<SystemId, SystemInfo<A>>,
    phase_systems: HashMap<PhaseId, Vec<SystemId>>,
    conditions: HashMap<TargetKey, SharedCondition>,
    bindings: HashMap<TargetKey, EventBinding>,
    plugins: Vec<SharedPlugin<A>>,
    plugin_ids: HashSet<PluginId>,
}

impl<A> ScheduleState<A> {
    fn pipeline(&self, id: PipelineId) -> Option<&Pipeline> {
        self.pipelines.iter().find(|pipeline| pipeline.id() == id)
    }

    fn record_pipeline(&mut self, pipeline: Pipeline) {
        match self
            .pipelines
            .iter_mut()
            .find(|recorded| recorded.id() == pipeline.id())
        {
            Some(recorded) => *recorded = pipeline,
            None => self.pipelines.push(pipeline),
        }
    }

    fn require_phase(&self, phase: &Phase) -> Result<Phase, ScheduleError> {
        self.graph
            .phase(phase.id())
            .cloned()
            .ok_or_else(|| ScheduleError::UnknownPhase {
                phase: phase.to_string(),
            })
    }

    fn require_pipeline(&self, pipeline: &Pipeline) -> Result<&Pipeline, ScheduleError> {
        self.pipeline(pipeline.id())
            .ok_or_else(|| ScheduleError::UnknownPipeline {
                pipeline: pipeline.to_string(),
            })
    }

    fn require_system(&self, id: SystemId) -> Result<&SystemInfo<A>, ScheduleError> {
        self.systems
            .get(&id)
            .ok_or(ScheduleError::UnknownSystem { id })
    }

    /// Resolves an anchor to the phase new members attach to: the last
    /// member of a pipeline when placing after it, the first when placing
    /// before it.
    fn anchor(&self, target: &OrderTarget, last: bool) -> Result<Option<PhaseId>, ScheduleError> {
        match target {
            OrderTarget::Phase(phase) => self.require_phase(phase).map(|phase| Some(phase.id())),
            OrderTarget::Pipeline(pipeline) => {
                let recorded = self.require_pipeline(pipeline)?;
                let member = if last {
                    recorded.last()
                } else {
                    recorded.first()
                };
                Ok(member.map(Phase::id))
            }
        }
    }

    fn condition_key(&self, target: &RunTarget) -> Result<TargetKey, ScheduleError> {
        match target {
            RunTarget::System(id) => self.require_system(*id).map(|_| TargetKey::System(*id)),
            RunTarget::Phase(phase) => self
                .require_phase(phase)
                .map(|phase| TargetKey::Phase(phase.id())),
            RunTarget::Pipeline(pipeline) => self
                .require_pipeline(pipeline)
                .map(|pipeline| TargetKey::Pipeline(pipeline.id())),
        }
    }

    fn is_phase_bound(&self, id: PhaseId) -> bool {
        self.bindings.contains_key(&TargetKey::Phase(id))
            || self.pipelines.iter().any(|pipeline| {
                self.bindings.contains_key(&TargetKey::Pipeline(pipeline.id()))
                    && pipeline.phases().iter().any(|phase| phase.id() == id)
            })
    }

    fn systems_in(&self, id: PhaseId) -> Vec<SystemInfo<A>> {
        self.phase_systems
            .get(&id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.systems.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of a phase pass: each system with the gate it had when the
    /// pass reached the phase.
    fn scheduled_in(&self, id: PhaseId) -> Vec<Scheduled<A>> {
        self.systems_in(id)
            .into_iter()
            .map(|info| Scheduled {
                condition: self.conditions.get(&TargetKey::System(info.id())).cloned(),
                info,
            })
            .collect()
    }
}

struct Scheduled<A> {
    info: SystemInfo<A>,
    condition: Option<SharedCondition>,
}

#[derive(Debug, Default)]
struct Timing {
    last_start: Option<Instant>,
    delta: Duration,
}

/// Per-pass bookkeeping: pipeline gates already evaluated and systems
/// already visited.
#[derive(Default)]
struct PassGates {
    pipelines: HashMap<PipelineId, bool>,
    visited: HashSet<SystemId>,
}

struct SchedulerInner<A> {
    args: A,
    clock: Clock,
    default_phase: Phase,
    state: Mutex<ScheduleState<A>>,
    timing: Mutex<Timing>,
    hooks: HooksAPI<A>,
}

// ─────────────────────────────────────────────────────────────────────────────
// SchedulerBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Configures a [`Scheduler`] before it is created.
///
/// ```
/// use cadence_schedule::phase::Phase;
/// use cadence_schedule::scheduler::Scheduler;
///
/// let scheduler = Scheduler::builder(())
///     .without_default_pipelines()
///     .with_default_phase(Phase::named("Tick"))
///     .build();
///
/// assert!(scheduler.ordered_phases().is_empty());
/// ```
pub struct SchedulerBuilder<A> {
    args: A,
    clock: Clock,
    default_phase: Phase,
    default_pipelines: bool,
}

impl<A: SchedulerArgs> SchedulerBuilder<A> {
    /// Reads time from `provider` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, provider: Arc<dyn ClockProvider>) -> Self {
        self.clock = Clock::with_provider(provider);
        self
    }

    /// Sets the phase used by [`Scheduler::add_system`].
    ///
    /// Defaults to [`Phase::UPDATE`]. The phase still has to be inserted
    /// before systems can be added to it.
    #[must_use]
    pub fn with_default_phase(mut self, phase: Phase) -> Self {
        self.default_phase = phase;
        self
    }

    /// Starts with an empty phase graph instead of the Startup and Main
    /// pipelines.
    #[must_use]
    pub fn without_default_pipelines(mut self) -> Self {
        self.default_pipelines = false;
        self
    }

    /// Creates the scheduler.
    ///
    /// Unless disabled, inserts [`Pipeline::startup`] followed by
    /// [`Pipeline::main`] and gates the Startup pipeline with
    /// [`run_once`], so startup phases run on the first pass only.
    #[must_use]
    pub fn build(self) -> Scheduler<A> {
        let scheduler = Scheduler {
            inner: Arc::new(SchedulerInner {
                args: self.args,
                clock: self.clock,
                default_phase: self.default_phase,
                state: Mutex::new(ScheduleState {
                    graph: PhaseGraph::new(),
                    pipelines: Vec::new(),
                    systems: HashMap::new(),
                    phase_systems: HashMap::new(),
                    conditions: HashMap::new(),
                    bindings: HashMap::new(),
                    plugins: Vec::new(),
                    plugin_ids: HashSet::new(),
                }),
                timing: Mutex::new(Timing::default()),
                hooks: HooksAPI::new(),
            }),
        };

        if self.default_pipelines {
            let startup = Pipeline::startup();
            let installed = scheduler
                .insert(&startup)
                .and_then(|scheduler| scheduler.insert_after(Pipeline::main(), &startup))
                .and_then(|scheduler| scheduler.set_run_condition(&startup, run_once()));
            if let Err(error) = installed {
                tracing::error!(%error, "failed to install default pipelines");
            }
        }

        scheduler
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Phase-ordered system scheduler.
///
/// `A` is shared, read-only state handed to every system through
/// [`SystemContext::args`].
pub struct Scheduler<A = ()> {
    inner: Arc<SchedulerInner<A>>,
}

impl<A> Clone for Scheduler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: SchedulerArgs + Default> Default for Scheduler<A> {
    fn default() -> Self {
        Self::new(A::default())
    }
}

impl<A> fmt::Debug for Scheduler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Scheduler");
        debug.field("default_phase", &self.inner.default_phase);
        if let Some(state) = self.inner.state.try_lock() {
            debug
                .field("phases", &state.graph.ordered())
                .field("pipelines", &state.pipelines.len())
                .field("systems", &state.systems.len())
                .field("bindings", &state.bindings.len())
                .field("plugins", &state.plugins.len());
        }
        debug.field("hooks", &self.inner.hooks).finish_non_exhaustive()
    }
}

impl<A: SchedulerArgs> Scheduler<A> {
    /// Creates a scheduler with the default configuration.
    #[must_use]
    pub fn new(args: A) -> Self {
        Self::builder(args).build()
    }

    /// Starts configuring a scheduler.
    #[must_use]
    pub fn builder(args: A) -> SchedulerBuilder<A> {
        SchedulerBuilder {
            args,
            clock: Clock::system(),
            default_phase: Phase::UPDATE,
            default_pipelines: true,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Returns the shared arguments.
    #[must_use]
    pub fn args(&self) -> &A {
        &self.inner.args
    }

    /// Returns the hook registry.
    #[must_use]
    pub fn hooks(&self) -> &HooksAPI<A> {
        &self.inner.hooks
    }

    /// Returns the clock used for delta time.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Returns the phase [`add_system`](Self::add_system) registers into.
    #[must_use]
    pub fn default_phase(&self) -> &Phase {
        &self.inner.default_phase
    }

    /// Returns the time between the starts of the two most recent
    /// [`run_all`](Self::run_all) passes.
    ///
    /// Zero until the second pass has started.
    #[must_use]
    pub fn delta_time(&self) -> Duration {
        self.inner.timing.lock().delta
    }

    /// Returns every inserted phase in execution order.
    #[must_use]
    pub fn ordered_phases(&self) -> Vec<Phase> {
        self.inner.state.lock().graph.ordered().to_vec()
    }

    /// Returns a snapshot of the phase graph.
    #[must_use]
    pub fn phase_graph(&self) -> PhaseGraph {
        self.inner.state.lock().graph.clone()
    }

    /// Returns the record of a registered system.
    #[must_use]
    pub fn system_info(&self, system: impl Into<SystemId>) -> Option<SystemInfo<A>> {
        self.inner.state.lock().systems.get(&system.into()).cloned()
    }

    /// Returns the systems of `phase` in run order.
    #[must_use]
    pub fn systems_in(&self, phase: &Phase) -> Vec<SystemInfo<A>> {
        self.inner.state.lock().systems_in(phase.id())
    }

    /// Returns the number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.inner.state.lock().systems.len()
    }

    /// Returns true if the system is registered.
    #[must_use]
    pub fn contains_system(&self, system: impl Into<SystemId>) -> bool {
        self.inner.state.lock().systems.contains_key(&system.into())
    }

    /// Returns true if the phase was inserted.
    #[must_use]
    pub fn contains_phase(&self, phase: &Phase) -> bool {
        self.inner.state.lock().graph.contains(phase.id())
    }

    /// Returns true if the pipeline was inserted.
    #[must_use]
    pub fn contains_pipeline(&self, pipeline: &Pipeline) -> bool {
        self.inner.state.lock().pipeline(pipeline.id()).is_some()
    }

    /// Returns true if `target` only runs when its event fires.
    ///
    /// A phase counts as bound when it is bound directly or belongs to a
    /// bound pipeline.
    #[must_use]
    pub fn is_event_bound(&self, target: impl Into<OrderTarget>) -> bool {
        let state = self.inner.state.lock();
        match target.into() {
            OrderTarget::Phase(phase) => state.is_phase_bound(phase.id()),
            OrderTarget::Pipeline(pipeline) => state
                .bindings
                .contains_key(&TargetKey::Pipeline(pipeline.id())),
        }
    }

    /// Returns the event name `target` is bound to, if it is bound to a
    /// named event.
    #[must_use]
    pub fn bound_event_name(&self, target: impl Into<OrderTarget>) -> Option<String> {
        let key = TargetKey::from(&target.into());
        self.inner
            .state
            .lock()
            .bindings
            .get(&key)
            .and_then(|binding| binding.event.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Phase Ordering
    // ─────────────────────────────────────────────────────────────────────

    /// Inserts a phase, or every member of a pipeline, at the end of the
    /// order.
    ///
    /// Re-inserting is idempotent for phases. For pipelines it records the
    /// current member list and adds any new members and adjacency edges.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::OrderingConflict`] if the pipeline's member
    /// order contradicts existing edges.
    pub fn insert(&self, target: impl Into<OrderTarget>) -> Result<&Self, ScheduleError> {
        self.apply_order(target.into(), Placement::Append)
    }

    /// Inserts `target` so that it runs after `after`.
    ///
    /// After a pipeline means after its last member.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownPhase`] or
    /// [`ScheduleError::UnknownPipeline`] if the anchor was never inserted,
    /// and [`ScheduleError::OrderingConflict`] if the edge closes a cycle.
    /// The graph is unchanged on error.
    pub fn insert_after(
        &self,
        target: impl Into<OrderTarget>,
        after: impl Into<OrderTarget>,
    ) -> Result<&Self, ScheduleError> {
        self.apply_order(target.into(), Placement::After(after.into()))
    }

    /// Inserts `target` so that it runs before `before`.
    ///
    /// Before a pipeline means before its first member.
    ///
    /// # Errors
    ///
    /// Same as [`insert_after`](Self::insert_after).
    pub fn insert_before(
        &self,
        target: impl Into<OrderTarget>,
        before: impl Into<OrderTarget>,
    ) -> Result<&Self, ScheduleError> {
        self.apply_order(target.into(), Placement::Before(before.into()))
    }

    fn apply_order(
        &self,
        target: OrderTarget,
        placement: Placement,
    ) -> Result<&Self, ScheduleError> {
        let added = {
            let mut state = self.inner.state.lock();
            let mut graph = state.graph.clone();
            let members = match &target {
                OrderTarget::Phase(phase) => vec![phase.clone()],
                OrderTarget::Pipeline(pipeline) => pipeline.phases().to_vec(),
            };
            let mut added = Vec::new();

            match placement {
                Placement::Append => {
                    for phase in &members {
                        if graph.register(phase) {
                            added.push(phase.clone());
                        }
                    }
                }
                Placement::After(anchor) => {
                    let anchor = state.anchor(&anchor, true)?;
                    let mut previous = anchor;
                    for phase in &members {
                        let new = match previous {
                            Some(previous) => graph.place_after(phase, previous),
                            None => graph.register(phase),
                        };
                        if new {
                            added.push(phase.clone());
                        }
                        previous = Some(phase.id());
                    }
                    if let (Some(anchor), Some(first)) = (anchor, members.first()) {
                        graph.add_edge(anchor, first.id())?;
                    }
                }
                Placement::Before(anchor) => {
                    let anchor = state.anchor(&anchor, false)?;
                    for phase in &members {
                        let new = match anchor {
                            Some(anchor) => graph.place_before(phase, anchor),
                            None => graph.register(phase),
                        };
                        if new {
                            added.push(phase.clone());
                        }
                    }
                    if let (Some(anchor), Some(last)) = (anchor, members.last()) {
                        graph.add_edge(last.id(), anchor)?;
                    }
                }
            }

            for pair in members.windows(2) {
                if let [from, to] = pair {
                    graph.add_edge(from.id(), to.id())?;
                }
            }

            graph.resolve()?;
            state.graph = graph;
            if let OrderTarget::Pipeline(pipeline) = target {
                state.record_pipeline(pipeline);
            }
            added
        };

        for phase in added {
            tracing::debug!(phase = %phase, "phase inserted");
            self.notify(&ScheduleEvent::PhaseAdd { phase });
        }
        Ok(self)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event Bindings
    // ─────────────────────────────────────────────────────────────────────

    /// Inserts `target` and runs it whenever `source` fires `event`.
    ///
    /// Bound phases are skipped by [`run_all`](Self::run_all). Binding a
    /// target again replaces and disconnects the previous binding.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Event`] if the source refuses the
    /// subscription, or any error of [`insert`](Self::insert). Nothing is
    /// changed on error.
    pub fn insert_on_event<T, S>(
        &self,
        target: impl Into<OrderTarget>,
        source: &S,
        event: Option<&str>,
    ) -> Result<&Self, ScheduleError>
    where
        T: 'static,
        S: EventSource<T> + ?Sized,
    {
        let target = target.into();
        let run_target = RunTarget::from(target.clone());
        let scheduler: Weak<SchedulerInner<A>> = Arc::downgrade(&self.inner);

        let callback: EventCallback<T> = Arc::new(move |_payload: &T| {
            let Some(inner) = scheduler.upgrade() else {
                return;
            };
            let scheduler = Scheduler { inner };
            if let Err(error) = scheduler.run(run_target.clone()) {
                tracing::warn!(binding = %run_target, %error, "event-triggered run failed");
            }
        });
        let connection = source.connect(event, callback)?;

        self.insert(target.clone())?;

        let replaced = self.inner.state.lock().bindings.insert(
            TargetKey::from(&target),
            EventBinding {
                event: event.map(str::to_owned),
                _connection: connection,
            },
        );
        tracing::debug!(binding = %target, event = ?event, "event binding installed");
        drop(replaced);
        Ok(self)
    }

    /// Removes the event binding on `target`, returning it to the polled
    /// pass.
    ///
    /// Returns true if a binding was removed.
    pub fn unbind(&self, target: impl Into<OrderTarget>) -> bool {
        let key = TargetKey::from(&target.into());
        let removed = self.inner.state.lock().bindings.remove(&key);
        removed.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────
    // System Registry
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a system in the default phase.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::DuplicateSystem`] if the handle is already
    /// registered, or [`ScheduleError::UnknownPhase`] if the default phase
    /// was never inserted.
    pub fn add_system<M>(
        &self,
        system: impl IntoSystemHandle<A, M>,
    ) -> Result<SystemId, ScheduleError> {
        let phase = self.inner.default_phase.clone();
        self.add_system_in(system, &phase)
    }

    /// Registers a system in `phase`.
    ///
    /// # Errors
    ///
    /// Same as [`add_system`](Self::add_system).
    pub fn add_system_in<M>(
        &self,
        system: impl IntoSystemHandle<A, M>,
        phase: &Phase,
    ) -> Result<SystemId, ScheduleError> {
        let handle = system.into_handle();
        let id = handle.id();
        self.register_handles(vec![handle], phase)?;
        Ok(id)
    }

    /// Registers several systems in the default phase, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns the first problem found. No system is registered on error,
    /// including when the same handle appears twice in `systems`.
    pub fn add_systems<I, M>(&self, systems: I) -> Result<Vec<SystemId>, ScheduleError>
    where
        I: IntoIterator,
        I::Item: IntoSystemHandle<A, M>,
    {
        let phase = self.inner.default_phase.clone();
        self.add_systems_in(systems, &phase)
    }

    /// Registers several systems in `phase`, all or nothing.
    ///
    /// # Errors
    ///
    /// Same as [`add_systems`](Self::add_systems).
    pub fn add_systems_in<I, M>(
        &self,
        systems: I,
        phase: &Phase,
    ) -> Result<Vec<SystemId>, ScheduleError>
    where
        I: IntoIterator,
        I::Item: IntoSystemHandle<A, M>,
    {
        let handles: Vec<SystemHandle<A>> =
            systems.into_iter().map(|system| system.into_handle()).collect();
        let ids = handles.iter().map(SystemHandle::id).collect();
        self.register_handles(handles, phase)?;
        Ok(ids)
    }

    fn register_handles(
        &self,
        handles: Vec<SystemHandle<A>>,
        phase: &Phase,
    ) -> Result<(), ScheduleError> {
        let infos = {
            let mut state = self.inner.state.lock();
            let phase = state.require_phase(phase)?;

            let mut seen = HashSet::with_capacity(handles.len());
            for handle in &handles {
                if state.systems.contains_key(&handle.id()) || !seen.insert(handle.id()) {
                    return Err(ScheduleError::DuplicateSystem {
                        id: handle.id(),
                        name: handle.name().to_owned(),
                    });
                }
            }

            let infos: Vec<SystemInfo<A>> = handles
                .into_iter()
                .map(|handle| SystemInfo::new(handle, phase.clone()))
                .collect();
            for info in &infos {
                state.systems.insert(info.id(), info.clone());
                state
                    .phase_systems
                    .entry(phase.id())
                    .or_default()
                    .push(info.id());
            }
            infos
        };

        for info in infos {
            tracing::debug!(system = info.name(), id = %info.id(), phase = %info.phase(), "system added");
            self.notify(&ScheduleEvent::SystemAdd { system: info });
        }
        Ok(())
    }

    /// Deregisters a system.
    ///
    /// `SystemRemove` observers run before the system is removed. A removal
    /// during the system's own phase pass takes effect from the next pass.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownSystem`] if the system is not
    /// registered.
    pub fn remove_system(&self, system: impl Into<SystemId>) -> Result<&Self, ScheduleError> {
        let id = system.into();
        let info = self.inner.state.lock().require_system(id)?.clone();

        self.notify(&ScheduleEvent::SystemRemove {
            system: info.clone(),
        });

        let condition = {
            let mut state = self.inner.state.lock();
            match state.systems.remove(&id) {
                Some(removed) => {
                    if let Some(ids) = state.phase_systems.get_mut(&removed.phase().id()) {
                        ids.retain(|other| *other != id);
                    }
                    state.conditions.remove(&TargetKey::System(id))
                }
                None => None,
            }
        };
        if let Some(condition) = condition {
            release_condition(&condition);
        }

        tracing::debug!(system = info.name(), id = %id, "system removed");
        Ok(self)
    }

    /// Swaps the callable of `old` for `new`.
    ///
    /// `new` takes over the phase, the position within the phase, the run
    /// condition, and the log history of `old`; `old` is no longer
    /// registered afterwards. Returns the id of the new system.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownSystem`] if `old` is not registered
    /// and [`ScheduleError::DuplicateSystem`] if `new` already is.
    pub fn replace_system<M>(
        &self,
        old: impl Into<SystemId>,
        new: impl IntoSystemHandle<A, M>,
    ) -> Result<SystemId, ScheduleError> {
        let old_id = old.into();
        let handle = new.into_handle();
        let new_id = handle.id();

        let (old, new) = {
            let mut state = self.inner.state.lock();
            let old = state.require_system(old_id)?.clone();
            if new_id == old_id {
                return Ok(old_id);
            }
            if state.systems.contains_key(&new_id) {
                return Err(ScheduleError::DuplicateSystem {
                    id: new_id,
                    name: handle.name().to_owned(),
                });
            }

            let new = old.replaced_by(handle);
            state.systems.remove(&old_id);
            state.systems.insert(new_id, new.clone());
            if let Some(ids) = state.phase_systems.get_mut(&old.phase().id())
                && let Some(slot) = ids.iter_mut().find(|id| **id == old_id)
            {
                *slot = new_id;
            }
            if let Some(condition) = state.conditions.remove(&TargetKey::System(old_id)) {
                state.conditions.insert(TargetKey::System(new_id), condition);
            }
            (old, new)
        };

        tracing::debug!(old = old.name(), new = new.name(), "system replaced");
        self.notify(&ScheduleEvent::SystemReplace { old, new });
        Ok(new_id)
    }

    /// Moves a system to the end of `phase`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownSystem`] or
    /// [`ScheduleError::UnknownPhase`].
    pub fn edit_system(
        &self,
        system: impl Into<SystemId>,
        phase: &Phase,
    ) -> Result<&Self, ScheduleError> {
        let id = system.into();
        let mut state = self.inner.state.lock();
        let info = state.require_system(id)?.clone();
        let phase = state.require_phase(phase)?;

        if let Some(ids) = state.phase_systems.get_mut(&info.phase().id()) {
            ids.retain(|other| *other != id);
        }
        state.phase_systems.entry(phase.id()).or_default().push(id);
        info.set_phase(phase);
        drop(state);

        tracing::debug!(system = info.name(), phase = %info.phase(), "system moved");
        Ok(self)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Run Conditions
    // ─────────────────────────────────────────────────────────────────────

    /// Sets the run condition of a system, phase, or pipeline.
    ///
    /// A target holds at most one condition; setting another replaces it and
    /// cleans the old one up. Phase and pipeline conditions are evaluated
    /// once per pass, before any system condition.
    ///
    /// # Errors
    ///
    /// Returns the `Unknown*` error matching the target kind if the target
    /// is not registered.
    pub fn set_run_condition(
        &self,
        target: impl Into<ConditionTarget>,
        condition: impl Condition,
    ) -> Result<&Self, ScheduleError> {
        let target = target.into();
        let boxed: BoxedCondition = Box::new(condition);
        let replaced = {
            let mut state = self.inner.state.lock();
            let key = state.condition_key(&target)?;
            state.conditions.insert(key, Arc::new(Mutex::new(boxed)))
        };
        if let Some(replaced) = replaced {
            release_condition(&replaced);
        }
        tracing::debug!(gate = %target, "run condition set");
        Ok(self)
    }

    /// Sets the run condition of a system.
    ///
    /// Same as [`set_run_condition`](Self::set_run_condition) with a system
    /// target: the new condition replaces any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownSystem`].
    pub fn add_run_condition(
        &self,
        system: impl Into<SystemId>,
        condition: impl Condition,
    ) -> Result<&Self, ScheduleError> {
        self.set_run_condition(RunTarget::System(system.into()), condition)
    }

    /// Removes and cleans up the run condition of `target`.
    ///
    /// Returns true if a condition was removed.
    pub fn clear_run_condition(&self, target: impl Into<ConditionTarget>) -> bool {
        let target = target.into();
        let removed = {
            let mut state = self.inner.state.lock();
            state
                .condition_key(&target)
                .ok()
                .and_then(|key| state.conditions.remove(&key))
        };
        removed.map(|condition| release_condition(&condition)).is_some()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Plugins
    // ─────────────────────────────────────────────────────────────────────

    /// Builds a plugin against this scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::DuplicatePlugin`] if a unique plugin of the
    /// same type was already added, or whatever the plugin's build returns.
    /// Changes the plugin made before failing are kept.
    pub fn add_plugin<P: Plugin<A>>(&self, plugin: P) -> Result<&Self, ScheduleError> {
        self.add_plugin_shared(PluginId::of::<P>(), Arc::new(plugin))?;
        Ok(self)
    }

    /// Adds a single plugin or a plugin group.
    ///
    /// # Errors
    ///
    /// Returns the first plugin error. Plugins added before it stay added.
    pub fn add_plugins<M>(&self, plugins: impl Plugins<A, M>) -> Result<&Self, ScheduleError> {
        plugins.add_to_scheduler(self)?;
        Ok(self)
    }

    pub(crate) fn add_plugin_shared(
        &self,
        id: PluginId,
        plugin: SharedPlugin<A>,
    ) -> Result<(), ScheduleError> {
        let unique = plugin.is_unique();
        if unique && !self.inner.state.lock().plugin_ids.insert(id) {
            return Err(ScheduleError::DuplicatePlugin {
                name: plugin.name().to_owned(),
            });
        }

        tracing::debug!(plugin = plugin.name(), "building plugin");
        if let Err(error) = plugin.build(self) {
            if unique {
                self.inner.state.lock().plugin_ids.remove(&id);
            }
            return Err(error);
        }

        self.inner.state.lock().plugins.push(plugin);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Running
    // ─────────────────────────────────────────────────────────────────────

    /// Runs every phase once, in resolved order.
    ///
    /// Phases bound to an event source are skipped. System failures are
    /// logged and broadcast as `SystemError`; they never stop the pass.
    pub fn run_all(&self) -> &Self {
        self.begin_pass();

        let plan: Vec<Phase> = {
            let state = self.inner.state.lock();
            state
                .graph
                .ordered()
                .iter()
                .filter(|phase| !state.is_phase_bound(phase.id()))
                .cloned()
                .collect()
        };

        let mut gates = PassGates::default();
        for phase in &plan {
            self.run_phase(phase, &mut gates);
        }
        self
    }

    /// Runs a system, phase, or pipeline immediately, whether or not it is
    /// event bound.
    ///
    /// Phases and pipelines are gated like in [`run_all`](Self::run_all). A
    /// system target is gated by its own condition only.
    ///
    /// # Errors
    ///
    /// Returns the `Unknown*` error matching the target kind if the target
    /// is not registered.
    pub fn run(&self, target: impl Into<RunTarget>) -> Result<&Self, ScheduleError> {
        match target.into() {
            RunTarget::System(id) => {
                let info = self.inner.state.lock().require_system(id)?.clone();
                self.call_system(&info, None);
            }
            RunTarget::Phase(phase) => {
                let phase = self.inner.state.lock().require_phase(&phase)?;
                self.run_phase(&phase, &mut PassGates::default());
            }
            RunTarget::Pipeline(pipeline) => {
                let phases: Vec<Phase> = {
                    let state = self.inner.state.lock();
                    let recorded = state.require_pipeline(&pipeline)?;
                    state
                        .graph
                        .ordered()
                        .iter()
                        .filter(|phase| recorded.contains(phase))
                        .cloned()
                        .collect()
                };
                let mut gates = PassGates::default();
                for phase in &phases {
                    self.run_phase(phase, &mut gates);
                }
            }
        }
        Ok(self)
    }

    fn begin_pass(&self) {
        let now = self.inner.clock.now();
        let mut timing = self.inner.timing.lock();
        timing.delta = timing
            .last_start
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        timing.last_start = Some(now);
    }

    fn run_phase(&self, phase: &Phase, gates: &mut PassGates) {
        self.notify(&ScheduleEvent::PhaseBegan {
            phase: phase.clone(),
        });

        let (pipeline_gates, phase_gate) = {
            let state = self.inner.state.lock();
            let pipelines: Vec<(PipelineId, SharedCondition)> = state
                .pipelines
                .iter()
                .filter(|pipeline| pipeline.contains(phase))
                .filter_map(|pipeline| {
                    state
                        .conditions
                        .get(&TargetKey::Pipeline(pipeline.id()))
                        .map(|condition| (pipeline.id(), Arc::clone(condition)))
                })
                .collect();
            let phase_gate = state
                .conditions
                .get(&TargetKey::Phase(phase.id()))
                .cloned();
            (pipelines, phase_gate)
        };

        for (pipeline, condition) in pipeline_gates {
            let open = *gates
                .pipelines
                .entry(pipeline)
                .or_insert_with(|| evaluate_condition(&condition, &pipeline));
            if !open {
                tracing::trace!(phase = %phase, %pipeline, "phase gated by pipeline condition");
                return;
            }
        }
        if let Some(condition) = phase_gate
            && !evaluate_condition(&condition, phase)
        {
            tracing::trace!(phase = %phase, "phase gated by run condition");
            return;
        }

        let systems = self.inner.state.lock().scheduled_in(phase.id());
        tracing::trace!(phase = %phase, systems = systems.len(), "running phase");
        for scheduled in &systems {
            // A system moved into a later phase mid-pass is picked up again
            // by that phase's snapshot.
            if !gates.visited.insert(scheduled.info.id()) {
                tracing::trace!(system = scheduled.info.name(), "already visited this pass");
                continue;
            }
            self.call_system(&scheduled.info, scheduled.condition.as_ref());
        }
    }

    /// Runs one system through the call layers.
    ///
    /// `snapshot` is the gate captured with the pass snapshot. It applies
    /// once the system has left the registry mid-pass; a registered system
    /// uses its current gate.
    fn call_system(&self, info: &SystemInfo<A>, snapshot: Option<&SharedCondition>) {
        let hooks = &self.inner.hooks;
        hooks.wrap_call(HookId::of::<OnOuterSystemCall>(), info, &mut || {
            let condition = {
                let state = self.inner.state.lock();
                if state.systems.contains_key(&info.id()) {
                    state.conditions.get(&TargetKey::System(info.id())).cloned()
                } else {
                    snapshot.cloned()
                }
            };
            if let Some(condition) = condition
                && !evaluate_condition(&condition, &info.id())
            {
                return;
            }
            hooks.wrap_call(HookId::of::<OnInnerSystemCall>(), info, &mut || {
                hooks.wrap_call(HookId::of::<OnSystemCall>(), info, &mut || {
                    self.invoke(info);
                });
            });
        });
    }

    fn invoke(&self, info: &SystemInfo<A>) {
        let ctx = SystemContext::new(self.clone(), info.clone());
        let outcome = match catch_unwind(AssertUnwindSafe(|| info.invoke(&ctx))) {
            Ok(result) => result,
            Err(payload) => Err(SystemError::Panicked(panic_message(payload.as_ref()))),
        };

        if let Err(error) = outcome {
            info.log(error.to_string());
            tracing::warn!(system = info.name(), id = %info.id(), %error, "system failed");
            self.notify(&ScheduleEvent::SystemError {
                system: info.clone(),
                error,
            });
        }
    }

    fn notify(&self, event: &ScheduleEvent<A>) {
        self.inner.hooks.notify(self, event);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Disconnects every event binding, cleans up every run condition, and
    /// calls [`Plugin::cleanup`] in reverse order of addition.
    ///
    /// Phases and systems stay registered. Calling it again only cleans up
    /// what was added since.
    pub fn cleanup(&self) {
        let (bindings, conditions, plugins) = {
            let mut state = self.inner.state.lock();
            state.plugin_ids.clear();
            (
                core::mem::take(&mut state.bindings),
                core::mem::take(&mut state.conditions),
                core::mem::take(&mut state.plugins),
            )
        };

        drop(bindings);
        for condition in conditions.values() {
            release_condition(condition);
        }
        for plugin in plugins.iter().rev() {
            tracing::debug!(plugin = plugin.name(), "cleaning up plugin");
            plugin.cleanup(self);
        }
    }
}

fn evaluate_condition(condition: &SharedCondition, gate: &dyn fmt::Display) -> bool {
    let Some(mut condition) = condition.try_lock() else {
        tracing::debug!(gate = %gate, "run condition re-entered, treating as false");
        return false;
    };
    match catch_unwind(AssertUnwindSafe(|| condition.evaluate())) {
        Ok(passed) => passed,
        Err(payload) => {
            tracing::warn!(
                gate = %gate,
                panic = %panic_message(payload.as_ref()),
                "run condition panicked, treating as false"
            );
            false
        }
    }
}

fn release_condition(condition: &SharedCondition) {
    match condition.try_lock() {
        Some(mut condition) => cleanup_condition(&mut **condition),
        None => tracing::debug!("run condition is evaluating, cleanup left to drop"),
    }
}
