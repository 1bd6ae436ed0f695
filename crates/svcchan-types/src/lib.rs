#![forbid(unsafe_code)]

//! Foundational types for the svcchan control plane.
//!
//! This crate has minimal dependencies and is pulled in by nearly every other
//! crate in the workspace: the durable [`model`] entities, the [`ids`]
//! newtypes they are keyed by, the cross-cutting [`error`] enums, the closed
//! set of job/event tags in [`jobs`] and [`events`], and the [`config`]
//! structures loaded from the daemon's TOML file.

/// A crate-wide `Result` alias defaulting to [`error::CoreError`].
pub type Result<T, E = error::CoreError> = std::result::Result<T, E>;

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod jobs;
pub mod model;

/// A curated set of the most commonly used types.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{CoreError, ErrorCode};
    pub use crate::ids::*;
    pub use crate::jobs::{JobStatus, JobType};
    pub use crate::model::*;
}
