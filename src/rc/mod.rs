//! Runlevel driver: brings the system to a target runlevel by ordering and
//! running every member service's `start` or `stop` action.
pub mod transition;

pub use transition::{transition, TransitionOptions, TransitionReport};
