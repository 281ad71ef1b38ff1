//! Pipelines: named, pre-ordered bundles of phases.
//!
//! A [`Pipeline`] is built like a plugin group: each mutation consumes the
//! pipeline and returns it, so definitions read as a chain.
//!
//! ```
//! use cadence_schedule::phase::Phase;
//! use cadence_schedule::pipeline::Pipeline;
//!
//! let input = Phase::named("Input");
//! let physics = Phase::named("Physics");
//! let render = Phase::named("Render");
//!
//! let frame = Pipeline::named("Frame")
//!     .insert(input.clone())
//!     .insert(render.clone())
//!     .insert_after(physics.clone(), &input);
//!
//! assert_eq!(frame.phases(), &[input, physics, render]);
//! ```
//!
//! Inserting a pipeline into a scheduler copies its member list. Editing the
//! pipeline value afterwards has no effect on that scheduler until the
//! pipeline is inserted again.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};
use std::borrow::Cow;

use crate::phase::{FIRST_DYNAMIC_ID, Phase};

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(FIRST_DYNAMIC_ID);

/// Process-unique identifier of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u64);

impl PipelineId {
    /// Returns the raw id value.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline#{}", self.0)
    }
}

/// An ordered group of phases that is inserted into a scheduler as one unit.
///
/// Clones share the pipeline's identity, so a clone can be used to address
/// the pipeline in [`Scheduler::run`](crate::scheduler::Scheduler::run) or
/// [`Scheduler::set_run_condition`](crate::scheduler::Scheduler::set_run_condition).
#[derive(Clone)]
pub struct Pipeline {
    id: PipelineId,
    name: Option<Cow<'static, str>>,
    phases: Vec<Phase>,
}

impl Pipeline {
    /// Creates an empty anonymous pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: PipelineId(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed)),
            name: None,
            phases: Vec::new(),
        }
    }

    /// Creates an empty pipeline with a debug name.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new()
        }
    }

    /// The built-in startup pipeline:
    /// `PreStartup → Startup → PostStartup`.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            id: PipelineId(1),
            name: Some(Cow::Borrowed("Startup")),
            phases: vec![Phase::PRE_STARTUP, Phase::STARTUP, Phase::POST_STARTUP],
        }
    }

    /// The built-in main pipeline:
    /// `First → PreUpdate → Update → PostUpdate → Last`.
    #[must_use]
    pub fn main() -> Self {
        Self {
            id: PipelineId(2),
            name: Some(Cow::Borrowed("Main")),
            phases: vec![
                Phase::FIRST,
                Phase::PRE_UPDATE,
                Phase::UPDATE,
                Phase::POST_UPDATE,
                Phase::LAST,
            ],
        }
    }

    /// Appends a phase to the end of the pipeline.
    ///
    /// Appending a phase that is already a member is a no-op.
    #[must_use]
    pub fn insert(mut self, phase: Phase) -> Self {
        if !self.contains(&phase) {
            self.phases.push(phase);
        }
        self
    }

    /// Inserts a phase directly after the member `after`.
    ///
    /// If `after` is not a member, the phase is appended at the end. If the
    /// phase is already a member it is moved.
    #[must_use]
    pub fn insert_after(mut self, phase: Phase, after: &Phase) -> Self {
        if &phase == after {
            return self;
        }
        self.phases.retain(|member| member != &phase);
        let position = self
            .phases
            .iter()
            .position(|member| member == after)
            .map_or(self.phases.len(), |index| index + 1);
        self.phases.insert(position, phase);
        self
    }

    /// Returns the pipeline's identity.
    #[must_use]
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns the debug name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the member phases in order.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Returns true if `phase` is a member.
    #[must_use]
    pub fn contains(&self, phase: &Phase) -> bool {
        self.phases.contains(phase)
    }

    /// Returns the first member, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Phase> {
        self.phases.first()
    }

    /// Returns the last member, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Phase> {
        self.phases.last()
    }

    /// Returns the number of member phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Returns true if the pipeline has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Pipeline {}

impl Hash for Pipeline {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.id),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id.0)
            .field("name", &self.name)
            .field("phases", &self.phases)
            .finish()
    }
}
