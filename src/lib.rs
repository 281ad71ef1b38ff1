//! A phase-ordered system scheduler for game loops and other fixed-rate
//! or event-driven programs.
//!
//! ```
//! use cadence::prelude::*;
//!
//! let scheduler = Scheduler::new(());
//! scheduler
//!     .add_system(|| {})
//!     .expect("update is a default phase");
//! scheduler.run_all();
//! ```

pub use cadence_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use cadence_internal::prelude::*;
}
