//! Domain types for the shared enrolment method
//!
//! This crate defines the types exchanged between the engine, the store and
//! the host:
//! - Enrolment instances and user enrolments
//! - Lifecycle events (created, updated, deleted)
//! - Sweep status codes

mod events;
mod types;

pub use events::*;
pub use types::*;

/// Name of this enrolment method, as stored in the instance `enrol` column
pub const METHOD_NAME: &str = "shared";

/// Component tag for role assignments and group memberships owned by this method
pub const COMPONENT: &str = "enrol_shared";
