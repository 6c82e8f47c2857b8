//! Remote peer identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one remote peer.
///
/// A target always names a system. When the component is left out the
/// target stands for every component of that system, which is how most
/// callers address an autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    /// System identity.
    pub system_id: u8,
    /// Component identity, if the target is a single component.
    pub component_id: Option<u8>,
}

impl Target {
    /// Creates a target for a whole system.
    pub const fn system(system_id: u8) -> Self {
        Self {
            system_id,
            component_id: None,
        }
    }

    /// Creates a target for one component of a system.
    pub const fn component(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id: Some(component_id),
        }
    }

    /// Returns true if a message coming from `source` belongs to this target.
    pub fn matches(&self, source: &Target) -> bool {
        if self.system_id != source.system_id {
            return false;
        }
        match (self.component_id, source.component_id) {
            (None, _) => true,
            (Some(own), Some(other)) => own == other,
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.component_id {
            Some(component) => write!(f, "{}/{}", self.system_id, component),
            None => write!(f, "{}/*", self.system_id),
        }
    }
}
