//! Host service interfaces for the shared enrolment engine
//!
//! The engine never talks to the learning platform directly. Roles, groups,
//! grades, caches, events and permission checks are reached through the
//! traits defined here. This crate contains no platform code itself, only
//! the interfaces, a progress-trace abstraction and an in-memory mock.

mod capabilities;
mod mock;
mod trace;
mod traits;

pub use capabilities::*;
pub use mock::*;
pub use trace::*;
pub use traits::*;
