//! Plugin-facing wrappers.
//!
//! Thin, stateless translations from vehicle-level requests to engine
//! operations, with result enums that are stable for callers.

mod action;
mod mission_raw;

pub use action::{Action, ActionResult};
pub use mission_raw::{MissionRaw, MissionRawResult};
