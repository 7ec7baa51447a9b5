//! Core engine for the shared enrolment method
//!
//! This crate contains:
//! - The instance manager (one instance per course, permission checks)
//! - The lifecycle engine (enrol, unenrol with last-enrolment cleanup)
//! - The expiry sweep
//! - The instance settings form contract

mod context;
mod form;
mod lifecycle;
mod plugin;
mod sync;

pub use context::*;
pub use form::*;
pub use lifecycle::*;
pub use plugin::*;
pub use sync::*;
