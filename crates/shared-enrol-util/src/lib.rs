//! Shared utilities for the shared enrolment workspace
//!
//! This crate provides:
//! - ID types (CourseId, UserId, InstanceId, ...)
//! - Timestamps and the (mockable) wall clock
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
