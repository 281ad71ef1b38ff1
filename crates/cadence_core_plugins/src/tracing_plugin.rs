//! Tracing and observability plugin.
//!
//! Provides [`TracingPlugin`], which installs a `tracing` subscriber and
//! hooks the scheduler so that system lifecycle changes, failures, and
//! individual system calls show up in the log.
//!
//! # Example
//!
//! ```
//! use cadence_core_plugins::{TracingFormat, TracingPlugin};
//! use cadence_schedule::scheduler::Scheduler;
//! use tracing::Level;
//!
//! let scheduler = Scheduler::new(());
//! scheduler
//!     .add_plugin(
//!         TracingPlugin::default()
//!             .with_level(Level::DEBUG)
//!             .with_format(TracingFormat::Compact),
//!     )
//!     .expect("tracing plugin is added once");
//!
//! scheduler.run_all();
//! ```

use cadence_schedule::error::ScheduleError;
use cadence_schedule::hooks::{
    HookId, OnSystemAdd, OnSystemCall, OnSystemError, OnSystemRemove, OnSystemReplace,
    ScheduleEvent,
};
use cadence_schedule::plugin::Plugin;
use cadence_schedule::scheduler::{Scheduler, SchedulerArgs};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Name under which the plugin registers its hooks.
pub const TRACING_HOOK: &str = "cadence::tracing";

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing and logging plugin.
///
/// On build it installs a global subscriber (unless one is already set) and
/// registers these hooks, all named [`TRACING_HOOK`]:
///
/// | Hook point | Effect |
/// |------------|--------|
/// | `OnSystemAdd`, `OnSystemRemove`, `OnSystemReplace` | `debug!` per registry change |
/// | `OnSystemError` | `error!` with the system name and error |
/// | `OnSystemCall` | wraps every call in a `system` span |
///
/// The hooks are removed again by [`Scheduler::cleanup`].
///
/// # Configuration Options
///
/// ```
/// use cadence_core_plugins::{TracingFormat, TracingPlugin};
/// use tracing::Level;
///
/// // Development: pretty output with span enter/exit
/// let dev_plugin = TracingPlugin::default()
///     .with_level(Level::DEBUG)
///     .with_format(TracingFormat::Pretty)
///     .with_span_events(true);
///
/// // Production: JSON output for log aggregation
/// let prod_plugin = TracingPlugin::default()
///     .with_level(Level::INFO)
///     .with_format(TracingFormat::Json)
///     .with_env_filter("cadence_schedule=info,my_app=debug");
/// ```
#[derive(Debug, Clone)]
pub struct TracingPlugin {
    /// Maximum log level.
    level: Level,
    /// Output format.
    format: TracingFormat,
    /// Environment filter (e.g., "`cadence_schedule=debug`").
    env_filter: Option<String>,
    /// Whether to include span events (enter/exit).
    span_events: bool,
}

impl Default for TracingPlugin {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingPlugin {
    /// Creates a new `TracingPlugin` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a custom environment filter string.
    ///
    /// Format: `target=level,target=level,...`. An invalid filter falls back
    /// to the configured level.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// Returns the configured level.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns the configured format.
    #[must_use]
    pub fn format(&self) -> TracingFormat {
        self.format
    }

    fn init_subscriber(&self) {
        let env_filter = match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        };

        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };

        // try_init fails if a global subscriber is already installed
        match self.format {
            TracingFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
            TracingFormat::Compact => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
            TracingFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
        }
    }
}

impl<A: SchedulerArgs> Plugin<A> for TracingPlugin {
    fn build(&self, scheduler: &Scheduler<A>) -> Result<(), ScheduleError> {
        self.init_subscriber();

        let hooks = scheduler.hooks();
        hooks
            .register_observer::<OnSystemAdd, _>(TRACING_HOOK, |_, event| {
                if let ScheduleEvent::SystemAdd { system } = event {
                    tracing::debug!(system = system.name(), phase = %system.phase(), "system registered");
                }
            })?
            .register_observer::<OnSystemRemove, _>(TRACING_HOOK, |_, event| {
                if let ScheduleEvent::SystemRemove { system } = event {
                    tracing::debug!(system = system.name(), "system deregistered");
                }
            })?
            .register_observer::<OnSystemReplace, _>(TRACING_HOOK, |_, event| {
                if let ScheduleEvent::SystemReplace { old, new } = event {
                    tracing::debug!(old = old.name(), new = new.name(), "system replaced");
                }
            })?
            .register_observer::<OnSystemError, _>(TRACING_HOOK, |_, event| {
                if let ScheduleEvent::SystemError { system, error } = event {
                    tracing::error!(system = system.name(), phase = %system.phase(), %error, "system error");
                }
            })?
            .register_call_hook::<OnSystemCall, _>(TRACING_HOOK, |info, mut next| {
                let span = tracing::debug_span!("system", name = info.name(), id = %info.id());
                let _entered = span.enter();
                next.run();
            })?;

        tracing::info!(
            level = %self.level,
            format = ?self.format,
            "TracingPlugin initialized"
        );
        Ok(())
    }

    fn cleanup(&self, scheduler: &Scheduler<A>) {
        let hooks = scheduler.hooks();
        for hook in [
            HookId::of::<OnSystemAdd>(),
            HookId::of::<OnSystemRemove>(),
            HookId::of::<OnSystemReplace>(),
            HookId::of::<OnSystemError>(),
            HookId::of::<OnSystemCall>(),
        ] {
            hooks.unregister(hook, TRACING_HOOK);
        }
        tracing::info!("TracingPlugin shutting down");
    }

    fn name(&self) -> &str {
        "TracingPlugin"
    }
}
