//! Shared, non-Planner-specific pieces of `bub`: the diagnostic origin type,
//! the build directory layout, the options file loader, and logging setup.
//!
//! Everything here is deliberately independent of the Planner's own data
//! model (`bub_core`) so that it can be reused by the worker pool and the
//! CLI binary without pulling in the whole build graph.

pub mod dirs;
pub mod logging;
pub mod options;
pub mod origin;

pub use dirs::BuildDirs;
pub use options::{LinkKind, OptionsError, OptionsFile};
pub use origin::Origin;
