//! Hook point markers.
//!
//! Each marker type names one place in the scheduler where hooks run. Use
//! them with [`HookId::of`] or with the typed registration methods on
//! [`HooksAPI`](super::HooksAPI).
//!
//! There are two kinds of hook points:
//!
//! - [`ObserverPoint`]s are notified after something happened and receive a
//!   [`ScheduleEvent`](super::events::ScheduleEvent).
//! - [`CallPoint`]s wrap a system invocation and receive a
//!   [`Next`](super::api::Next) continuation they decide whether to run.

use core::any::TypeId;

use variadics_please::all_tuples;

/// Identifier for a hook point, derived from its marker type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId {
    type_id: TypeId,
    type_name: &'static str,
}

impl HookId {
    /// Creates a `HookId` for the given marker type.
    #[must_use]
    pub fn of<H: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            type_name: core::any::type_name::<H>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the full type name of the marker.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the marker's name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.type_name
            .rsplit("::")
            .next()
            .unwrap_or(self.type_name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Marker Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Marker trait for every hook point.
pub trait HookPoint: 'static {}

/// Hook points that broadcast a [`ScheduleEvent`](super::events::ScheduleEvent).
pub trait ObserverPoint: HookPoint {}

/// Hook points that wrap a system call.
pub trait CallPoint: HookPoint {}

/// Types that can be converted into a list of observer hook ids.
///
/// Implemented for single observer points and tuples of them, so one
/// observer can be registered on several points at once.
pub trait IntoHookIds {
    /// Returns the hook ids for this type.
    fn hook_ids() -> Vec<HookId>;
}

impl<H: ObserverPoint> IntoHookIds for H {
    fn hook_ids() -> Vec<HookId> {
        vec![HookId::of::<H>()]
    }
}

macro_rules! impl_into_hook_ids_for_tuple {
    ($($H:ident),*) => {
        impl<$($H: ObserverPoint),*> IntoHookIds for ($($H,)*) {
            fn hook_ids() -> Vec<HookId> {
                vec![$(HookId::of::<$H>()),*]
            }
        }
    };
}

all_tuples!(impl_into_hook_ids_for_tuple, 2, 8, H);

// ─────────────────────────────────────────────────────────────────────────────
// Registry Observers
// ─────────────────────────────────────────────────────────────────────────────

/// Fired after a system is registered.
///
/// Event data: [`ScheduleEvent::SystemAdd`](super::events::ScheduleEvent::SystemAdd)
pub struct OnSystemAdd;
impl HookPoint for OnSystemAdd {}
impl ObserverPoint for OnSystemAdd {}

/// Fired before a system is deregistered.
///
/// Event data: [`ScheduleEvent::SystemRemove`](super::events::ScheduleEvent::SystemRemove)
pub struct OnSystemRemove;
impl HookPoint for OnSystemRemove {}
impl ObserverPoint for OnSystemRemove {}

/// Fired after a system's callable is swapped.
///
/// Event data: [`ScheduleEvent::SystemReplace`](super::events::ScheduleEvent::SystemReplace)
pub struct OnSystemReplace;
impl HookPoint for OnSystemReplace {}
impl ObserverPoint for OnSystemReplace {}

/// Fired when a system returns an error or panics.
///
/// Event data: [`ScheduleEvent::SystemError`](super::events::ScheduleEvent::SystemError)
pub struct OnSystemError;
impl HookPoint for OnSystemError {}
impl ObserverPoint for OnSystemError {}

// ─────────────────────────────────────────────────────────────────────────────
// Phase Observers
// ─────────────────────────────────────────────────────────────────────────────

/// Fired once for each phase newly inserted into the ordering graph.
///
/// Event data: [`ScheduleEvent::PhaseAdd`](super::events::ScheduleEvent::PhaseAdd)
pub struct OnPhaseAdd;
impl HookPoint for OnPhaseAdd {}
impl ObserverPoint for OnPhaseAdd {}

/// Fired at the start of every phase pass, before its gates are evaluated.
///
/// Event data: [`ScheduleEvent::PhaseBegan`](super::events::ScheduleEvent::PhaseBegan)
pub struct OnPhaseBegan;
impl HookPoint for OnPhaseBegan {}
impl ObserverPoint for OnPhaseBegan {}

// ─────────────────────────────────────────────────────────────────────────────
// Call Wrappers
// ─────────────────────────────────────────────────────────────────────────────

/// Outermost call layer. Runs before the system's own run condition.
pub struct OnOuterSystemCall;
impl HookPoint for OnOuterSystemCall {}
impl CallPoint for OnOuterSystemCall {}

/// Runs after the system's run condition passed.
pub struct OnInnerSystemCall;
impl HookPoint for OnInnerSystemCall {}
impl CallPoint for OnInnerSystemCall {}

/// Innermost call layer, directly around the system body.
pub struct OnSystemCall;
impl HookPoint for OnSystemCall {}
impl CallPoint for OnSystemCall {}
