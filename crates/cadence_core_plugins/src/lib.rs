//! Core infrastructure plugins for Cadence.
//!
//! This crate provides plugins most Cadence schedulers want:
//!
//! - [`TracingPlugin`] - Subscriber setup and hook-driven logging via `tracing`
//! - [`DiagnosticsPlugin`] - Per-system call counts, error counts, and timings
//! - [`DefaultPlugins`] - Both of the above
//!
//! # Example
//!
//! ```
//! use cadence_core_plugins::DefaultPlugins;
//! use cadence_schedule::plugin::PluginGroup;
//! use cadence_schedule::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new(());
//! scheduler
//!     .add_plugins(DefaultPlugins.build())
//!     .expect("default plugins build on a fresh scheduler");
//! scheduler.run_all();
//! ```
//!
//! # Individual Plugin Usage
//!
//! ```
//! use cadence_core_plugins::{DiagnosticsPlugin, TracingPlugin};
//! use cadence_schedule::scheduler::Scheduler;
//! use tracing::Level;
//!
//! let diagnostics = DiagnosticsPlugin::new();
//! let stats = diagnostics.diagnostics();
//!
//! let scheduler = Scheduler::new(());
//! scheduler
//!     .add_plugin(TracingPlugin::default().with_level(Level::DEBUG))
//!     .and_then(|scheduler| scheduler.add_plugin(diagnostics))
//!     .expect("plugins are added once");
//! # let _ = stats;
//! ```

mod diagnostics;
mod tracing_plugin;

pub use diagnostics::{DIAGNOSTICS_HOOK, Diagnostics, DiagnosticsPlugin, SystemStats};
pub use tracing_plugin::{TRACING_HOOK, TracingFormat, TracingPlugin};

use cadence_schedule::plugin::{PluginGroup, PluginGroupBuilder};
use cadence_schedule::scheduler::SchedulerArgs;

/// Default plugins for most schedulers.
///
/// Includes:
/// - [`TracingPlugin`] - Logging and observability
/// - [`DiagnosticsPlugin`] - Call statistics
///
/// The group owns its diagnostics plugin. To read the statistics, swap in
/// your own instance:
///
/// ```
/// use cadence_core_plugins::{DefaultPlugins, DiagnosticsPlugin};
/// use cadence_schedule::plugin::PluginGroup;
/// use cadence_schedule::scheduler::Scheduler;
///
/// let diagnostics = DiagnosticsPlugin::new();
/// let stats = diagnostics.diagnostics();
///
/// let scheduler = Scheduler::new(());
/// scheduler
///     .add_plugins(
///         DefaultPlugins
///             .build()
///             .disable::<DiagnosticsPlugin>()
///             .add(diagnostics),
///     )
///     .expect("default plugins build on a fresh scheduler");
/// # let _ = stats;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlugins;

impl<A: SchedulerArgs> PluginGroup<A> for DefaultPlugins {
    fn build(self) -> PluginGroupBuilder<A> {
        PluginGroupBuilder::new()
            .add(TracingPlugin::default())
            .add(DiagnosticsPlugin::default())
    }
}

/// Minimal plugins for headless or testing scenarios.
///
/// Includes only [`DiagnosticsPlugin`]; no subscriber is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalPlugins;

impl<A: SchedulerArgs> PluginGroup<A> for MinimalPlugins {
    fn build(self) -> PluginGroupBuilder<A> {
        PluginGroupBuilder::new().add(DiagnosticsPlugin::default())
    }
}
