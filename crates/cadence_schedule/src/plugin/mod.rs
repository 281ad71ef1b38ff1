//! Plugins: reusable bundles of scheduler configuration.
//!
//! A plugin receives the scheduler in [`Plugin::build`] and may insert
//! phases, add systems, attach conditions, or register hooks. Plugins are
//! built synchronously when added, and cleaned up in reverse order by
//! [`Scheduler::cleanup`](crate::scheduler::Scheduler::cleanup).
//!
//! # Example
//!
//! ```
//! use cadence_schedule::error::ScheduleError;
//! use cadence_schedule::phase::Phase;
//! use cadence_schedule::plugin::Plugin;
//! use cadence_schedule::scheduler::Scheduler;
//!
//! struct HeartbeatPlugin;
//!
//! impl Plugin<()> for HeartbeatPlugin {
//!     fn build(&self, scheduler: &Scheduler<()>) -> Result<(), ScheduleError> {
//!         scheduler.add_system_in(|| println!("tick"), &Phase::LAST)?;
//!         Ok(())
//!     }
//! }
//!
//! let scheduler = Scheduler::new(());
//! scheduler
//!     .add_plugin(HeartbeatPlugin)
//!     .expect("plugin should build");
//! assert_eq!(scheduler.systems_in(&Phase::LAST).len(), 1);
//! ```

use core::any::TypeId;
use std::sync::Arc;

use crate::error::ScheduleError;
use crate::scheduler::{Scheduler, SchedulerArgs};

// ─────────────────────────────────────────────────────────────────────────────
// PluginId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a plugin type.
///
/// Used for duplicate detection and for addressing plugins inside a
/// [`PluginGroupBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId {
    type_id: TypeId,
    type_name: &'static str,
}

impl PluginId {
    /// Creates a `PluginId` for the given plugin type.
    #[must_use]
    pub fn of<P: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: core::any::type_name::<P>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of scheduler configuration.
///
/// # Lifecycle
///
/// 1. **Build** - [`build`](Self::build) runs once, inside `add_plugin`
/// 2. **Cleanup** - [`cleanup`](Self::cleanup) runs during
///    [`Scheduler::cleanup`](crate::scheduler::Scheduler::cleanup), in reverse
///    order of addition
pub trait Plugin<A: SchedulerArgs>: Send + Sync + 'static {
    /// Configures the scheduler.
    ///
    /// # Errors
    ///
    /// Any [`ScheduleError`] is returned from `add_plugin` unchanged. The
    /// plugin is not recorded, so it can be added again.
    fn build(&self, scheduler: &Scheduler<A>) -> Result<(), ScheduleError>;

    /// Releases anything the plugin set up outside the scheduler.
    fn cleanup(&self, _scheduler: &Scheduler<A>) {}

    /// Returns the plugin's name for debugging and error messages.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Returns true if this plugin can only be added once.
    ///
    /// Default is `true`: adding the same plugin type twice fails with
    /// [`ScheduleError::DuplicatePlugin`].
    fn is_unique(&self) -> bool {
        true
    }
}

/// Shared, type-erased plugin.
pub type SharedPlugin<A> = Arc<dyn Plugin<A>>;

// ─────────────────────────────────────────────────────────────────────────────
// Plugins Trait (for add_plugins polymorphism)
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for types that can be added to a scheduler as plugins.
///
/// Enables `scheduler.add_plugins()` to accept both single plugins and
/// plugin groups via [`PluginGroupBuilder`]. Users typically don't implement
/// this trait directly.
pub trait Plugins<A: SchedulerArgs, Marker> {
    /// Adds these plugins to the scheduler.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while adding a plugin. Plugins added
    /// before it stay added.
    fn add_to_scheduler(self, scheduler: &Scheduler<A>) -> Result<(), ScheduleError>;
}

/// Marker for single plugins.
pub struct PluginMarker;

/// Marker for plugin groups.
pub struct PluginGroupMarker;

impl<A: SchedulerArgs, P: Plugin<A>> Plugins<A, PluginMarker> for P {
    fn add_to_scheduler(self, scheduler: &Scheduler<A>) -> Result<(), ScheduleError> {
        scheduler.add_plugin_shared(PluginId::of::<P>(), Arc::new(self))
    }
}

impl<A: SchedulerArgs> Plugins<A, PluginGroupMarker> for PluginGroupBuilder<A> {
    fn add_to_scheduler(self, scheduler: &Scheduler<A>) -> Result<(), ScheduleError> {
        for entry in self.plugins {
            scheduler.add_plugin_shared(entry.id, entry.plugin)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginGroup Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A collection of plugins that can be added together.
///
/// Users can customize the group before adding it to the scheduler:
///
/// ```
/// use cadence_schedule::prelude::*;
///
/// struct Physics;
///
/// impl Plugin<()> for Physics {
///     fn build(&self, scheduler: &Scheduler<()>) -> Result<(), ScheduleError> {
///         scheduler.add_system(|| {})?;
///         Ok(())
///     }
/// }
///
/// struct Inspector;
///
/// impl Plugin<()> for Inspector {
///     fn build(&self, _scheduler: &Scheduler<()>) -> Result<(), ScheduleError> {
///         Ok(())
///     }
/// }
///
/// struct GamePlugins;
///
/// impl PluginGroup<()> for GamePlugins {
///     fn build(self) -> PluginGroupBuilder<()> {
///         PluginGroupBuilder::new().add(Physics).add(Inspector)
///     }
/// }
///
/// let scheduler = Scheduler::new(());
/// scheduler.add_plugins(GamePlugins.build().disable::<Inspector>())?;
/// assert_eq!(scheduler.system_count(), 1);
/// # Ok::<(), ScheduleError>(())
/// ```
pub trait PluginGroup<A: SchedulerArgs> {
    /// Returns the plugins in this group.
    fn build(self) -> PluginGroupBuilder<A>;
}

struct GroupEntry<A> {
    id: PluginId,
    plugin: SharedPlugin<A>,
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginGroupBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for customizing plugin groups.
///
/// Allows adding, removing, and reordering plugins within a group.
pub struct PluginGroupBuilder<A> {
    plugins: Vec<GroupEntry<A>>,
}

impl<A> Default for PluginGroupBuilder<A> {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }
}

impl<A: SchedulerArgs> PluginGroupBuilder<A> {
    /// Creates a new empty plugin group builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin to the end of the group.
    #[must_use]
    #[expect(
        clippy::should_implement_trait,
        reason = "This is a builder method, not std::ops::Add"
    )]
    pub fn add<P: Plugin<A>>(mut self, plugin: P) -> Self {
        self.plugins.push(GroupEntry {
            id: PluginId::of::<P>(),
            plugin: Arc::new(plugin),
        });
        self
    }

    /// Adds a plugin before `Target` in the group.
    ///
    /// If `Target` is not found, the plugin is added at the beginning.
    #[must_use]
    pub fn add_before<P: Plugin<A>, Target: 'static>(mut self, plugin: P) -> Self {
        let position = self.position_of::<Target>().unwrap_or(0);
        self.plugins.insert(
            position,
            GroupEntry {
                id: PluginId::of::<P>(),
                plugin: Arc::new(plugin),
            },
        );
        self
    }

    /// Adds a plugin after `Target` in the group.
    ///
    /// If `Target` is not found, the plugin is added at the end.
    #[must_use]
    pub fn add_after<P: Plugin<A>, Target: 'static>(mut self, plugin: P) -> Self {
        let position = self
            .position_of::<Target>()
            .map_or(self.plugins.len(), |index| index + 1);
        self.plugins.insert(
            position,
            GroupEntry {
                id: PluginId::of::<P>(),
                plugin: Arc::new(plugin),
            },
        );
        self
    }

    /// Removes every plugin of type `P` from the group.
    ///
    /// If the plugin is not found, this is a no-op.
    #[must_use]
    pub fn disable<P: 'static>(mut self) -> Self {
        let id = PluginId::of::<P>();
        self.plugins.retain(|entry| entry.id != id);
        self
    }

    /// Returns true if the group contains a plugin of type `P`.
    #[must_use]
    pub fn contains<P: 'static>(&self) -> bool {
        self.position_of::<P>().is_some()
    }

    /// Returns the plugin names in group order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|entry| entry.plugin.name()).collect()
    }

    /// Returns the number of plugins in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if the group contains no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn position_of<P: 'static>(&self) -> Option<usize> {
        let id = PluginId::of::<P>();
        self.plugins.iter().position(|entry| entry.id == id)
    }
}
