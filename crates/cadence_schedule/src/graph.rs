//! The resolved phase ordering of a scheduler.
//!
//! A [`PhaseGraph`] records every phase inserted into a scheduler together
//! with the hard "runs before" edges between them. Phases with no edge
//! between them are ordered by a soft insertion sequence, so a bare
//! `insert` keeps the order phases were added in while `insert_after` and
//! `insert_before` pull a phase next to its anchor.
//!
//! The graph itself is read-only outside this crate. The scheduler mutates
//! a clone and only commits it once [`PhaseGraph::resolve`] succeeds, which
//! keeps every rejected mutation free of side effects.

use core::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::HashMap;

use crate::error::ScheduleError;
use crate::phase::{Phase, PhaseId};

/// Phases, ordering edges, and the cached topological order derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseGraph {
    phases: HashMap<PhaseId, Phase>,
    /// Soft order used to break ties between unconstrained phases.
    sequence: Vec<PhaseId>,
    /// `from -> [to]`: every `to` runs after its `from`.
    edges: HashMap<PhaseId, Vec<PhaseId>>,
    ordered: Vec<Phase>,
}

impl PhaseGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of phases in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Returns true if no phase was inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Returns true if the phase was inserted.
    #[must_use]
    pub fn contains(&self, id: PhaseId) -> bool {
        self.phases.contains_key(&id)
    }

    /// Returns the registered phase for `id`.
    #[must_use]
    pub fn phase(&self, id: PhaseId) -> Option<&Phase> {
        self.phases.get(&id)
    }

    /// Returns phases in resolved execution order.
    #[must_use]
    pub fn ordered(&self) -> &[Phase] {
        &self.ordered
    }

    /// Returns the phases that must run after `id`.
    #[must_use]
    pub fn successors(&self, id: PhaseId) -> &[PhaseId] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the total number of hard ordering edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Returns true if `before` is ordered strictly ahead of `after`.
    #[must_use]
    pub fn runs_before(&self, before: PhaseId, after: PhaseId) -> bool {
        let position = |id: PhaseId| self.ordered.iter().position(|phase| phase.id() == id);
        matches!((position(before), position(after)), (Some(a), Some(b)) if a < b)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation (crate-internal, always followed by `resolve`)
    // ─────────────────────────────────────────────────────────────────────

    /// Appends `phase` to the soft sequence. Returns true if it is new.
    pub(crate) fn register(&mut self, phase: &Phase) -> bool {
        if self.phases.contains_key(&phase.id()) {
            return false;
        }
        self.phases.insert(phase.id(), phase.clone());
        self.sequence.push(phase.id());
        true
    }

    /// Places `phase` directly behind `anchor` in the soft sequence,
    /// registering it if needed. Returns true if it is new.
    pub(crate) fn place_after(&mut self, phase: &Phase, anchor: PhaseId) -> bool {
        self.place(phase, anchor, 1)
    }

    /// Places `phase` directly ahead of `anchor` in the soft sequence,
    /// registering it if needed. Returns true if it is new.
    pub(crate) fn place_before(&mut self, phase: &Phase, anchor: PhaseId) -> bool {
        self.place(phase, anchor, 0)
    }

    fn place(&mut self, phase: &Phase, anchor: PhaseId, offset: usize) -> bool {
        if phase.id() == anchor {
            return self.register(phase);
        }
        let added = !self.phases.contains_key(&phase.id());
        self.phases.insert(phase.id(), phase.clone());
        self.sequence.retain(|id| *id != phase.id());
        let index = self
            .sequence
            .iter()
            .position(|id| *id == anchor)
            .map_or(self.sequence.len(), |index| index + offset);
        self.sequence.insert(index, phase.id());
        added
    }

    /// Adds the hard edge `from -> to`.
    ///
    /// Both endpoints must already be registered. A self edge is rejected
    /// immediately; longer cycles surface in [`resolve`](Self::resolve).
    pub(crate) fn add_edge(&mut self, from: PhaseId, to: PhaseId) -> Result<(), ScheduleError> {
        if from == to {
            return Err(ScheduleError::OrderingConflict {
                cycle: vec![self.label(from)],
            });
        }
        let targets = self.edges.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        Ok(())
    }

    /// Recomputes the execution order.
    ///
    /// Uses Kahn's algorithm; among phases whose predecessors have all been
    /// emitted, the one earliest in the soft sequence goes first.
    pub(crate) fn resolve(&mut self) -> Result<(), ScheduleError> {
        let position: HashMap<PhaseId, usize> = self
            .sequence
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();

        let mut in_degree: HashMap<PhaseId, usize> =
            self.sequence.iter().map(|id| (*id, 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .filter_map(|(id, _)| position.get(id).copied().map(Reverse))
            .collect();

        let mut ordered = Vec::with_capacity(self.sequence.len());
        while let Some(Reverse(index)) = ready.pop() {
            let Some(id) = self.sequence.get(index).copied() else {
                continue;
            };
            if let Some(phase) = self.phases.get(&id) {
                ordered.push(phase.clone());
            }
            for target in self.successors(id) {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree -= 1;
                    if *degree == 0
                        && let Some(index) = position.get(target)
                    {
                        ready.push(Reverse(*index));
                    }
                }
            }
        }

        if ordered.len() != self.sequence.len() {
            let cycle = self
                .sequence
                .iter()
                .filter(|id| in_degree.get(*id).is_some_and(|degree| *degree > 0))
                .map(|id| self.label(*id))
                .collect();
            return Err(ScheduleError::OrderingConflict { cycle });
        }

        self.ordered = ordered;
        Ok(())
    }

    fn label(&self, id: PhaseId) -> String {
        self.phases
            .get(&id)
            .map_or_else(|| id.to_string(), ToString::to_string)
    }
}
