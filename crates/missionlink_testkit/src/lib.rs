//! # MissionLink Testkit
//!
//! Test utilities for MissionLink.
//!
//! This crate provides:
//! - A simulated autopilot answering commands and the mission protocol
//! - A lossy, seeded link carrying CBOR frames between engine and vehicle
//! - A virtual clock implementing the engine's timer service
//! - Deterministic and wall-clock end-to-end harnesses
//! - Mission fixtures and proptest generators
//!
//! ## Usage
//!
//! ```rust,ignore
//! use missionlink_testkit::prelude::*;
//!
//! #[test]
//! fn upload_survives_loss() {
//!     let sim = Simulation::new(SimConfig::default().with_loss(0.1).with_seed(3));
//!     sim.upload(MissionType::Mission, interleaved_mission()).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod fixtures;
pub mod generators;
pub mod link;
pub mod sim;
pub mod vehicle;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::link::*;
    pub use crate::sim::*;
    pub use crate::vehicle::*;
    pub use missionlink_protocol::{CommandCode, MissionItem, MissionType};
}

pub use clock::ManualClock;
pub use link::{Direction, DropRule, LinkStats, SimLink};
pub use sim::{RealtimeSim, SimConfig, Simulation};
pub use vehicle::{CommandBehavior, SimVehicle};
