//! Lifecycle hooks for the scheduler.
//!
//! Hooks let plugins observe the scheduler and wrap every system call
//! without touching the systems themselves.
//!
//! # Architecture
//!
//! - **Hook points** ([`schedule`]): marker types naming where hooks run
//! - **Events** ([`events`]): the [`ScheduleEvent`] enum delivered to observers
//! - **API** ([`api`]): registration and invocation through [`HooksAPI`]
//!
//! # Call Pipeline
//!
//! Each system call passes through three layers of call hooks:
//!
//! ```text
//! OnOuterSystemCall hooks
//!   └─ system run condition
//!        └─ OnInnerSystemCall hooks
//!             └─ OnSystemCall hooks
//!                  └─ system body
//! ```
//!
//! Within a layer, hooks registered earlier wrap hooks registered later.

pub mod api;
pub mod events;
pub mod schedule;

pub use api::{BoxedHook, HookRegistrationError, HooksAPI, Next};
pub use events::ScheduleEvent;
pub use schedule::{
    CallPoint, HookId, HookPoint, IntoHookIds, ObserverPoint, OnInnerSystemCall, OnOuterSystemCall,
    OnPhaseAdd, OnPhaseBegan, OnSystemAdd, OnSystemCall, OnSystemError, OnSystemRemove,
    OnSystemReplace,
};
