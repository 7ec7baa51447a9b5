//! Standalone host for the shared enrolment daemon
//!
//! Keeps the course directory, role catalog and assignments, groups,
//! grades and last-access records in a local SQLite database so the
//! engine can run outside a full learning platform.

mod adapter;
mod services;

pub use adapter::*;
