//! # Cadence Internal Library
//!
//! Re-exports the core Cadence crates for convenience.

/// Phase-ordered system scheduling.
pub use cadence_schedule;

/// Infrastructure plugins: tracing and diagnostics.
#[cfg(feature = "core_plugins")]
pub use cadence_core_plugins;

/// Re-export all common types for easy access.
pub mod prelude {
    #[cfg(feature = "core_plugins")]
    pub use cadence_core_plugins::{
        DefaultPlugins, Diagnostics, DiagnosticsPlugin, MinimalPlugins, TracingFormat,
        TracingPlugin,
    };
    pub use cadence_schedule::prelude::*;
}
