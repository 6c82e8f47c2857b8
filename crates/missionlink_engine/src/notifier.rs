//! Mission-change notifier.
//!
//! The remote periodically broadcasts a `MissionStatus` describing each
//! stored list. The notifier keeps the last fingerprint seen per source and
//! list type in the [`Registry`] and raises a zero-payload event when it
//! changes for reasons other than this engine's own transfers.
//!
//! Rules:
//! - The first observation only records a baseline.
//! - While a transfer is in flight on a matching target, observations are
//!   ignored; the transfer records its own baseline when it succeeds.
//! - A change fires every subscriber of a matching target exactly once.

use crate::registry::{Observation, Registry};
use missionlink_protocol::{Envelope, Message, MissionStatus, MissionType, Target};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Compact summary of a stored mission list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionFingerprint {
    /// Number of items.
    pub count: u16,
    /// List identity reported by the remote; 0 when not tracked.
    pub opaque_id: u32,
}

impl MissionFingerprint {
    /// Creates a fingerprint.
    pub fn new(count: u16, opaque_id: u32) -> Self {
        Self { count, opaque_id }
    }

    /// Returns true if the two fingerprints describe different lists.
    ///
    /// List identities are compared when both sides report one; otherwise
    /// only the item counts can be compared.
    pub fn differs_from(&self, other: &Self) -> bool {
        if self.opaque_id != 0 && other.opaque_id != 0 {
            self.opaque_id != other.opaque_id
        } else {
            self.count != other.count
        }
    }
}

impl From<&MissionStatus> for MissionFingerprint {
    fn from(status: &MissionStatus) -> Self {
        Self::new(status.total, status.opaque_id)
    }
}

/// Fingerprint recorded by a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Baseline {
    pub source: Target,
    pub mission_type: MissionType,
    pub fingerprint: MissionFingerprint,
}

/// Handle returned by `on_mission_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeSubscription(u64);

type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

struct Subscriber {
    id: ChangeSubscription,
    target: Target,
    handler: ChangeHandler,
}

pub(crate) struct MissionChangeNotifier {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl MissionChangeNotifier {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe(&self, target: Target, handler: ChangeHandler) -> ChangeSubscription {
        let id = ChangeSubscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber {
            id,
            target,
            handler,
        });
        id
    }

    pub(crate) fn unsubscribe(&self, id: ChangeSubscription) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|sub| sub.id != id);
        subscribers.len() != before
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Handles an inbound status message.
    pub(crate) fn on_status(&self, registry: &Registry, envelope: &Envelope) {
        let Message::MissionStatus(status) = &envelope.message else {
            return;
        };
        let fingerprint = MissionFingerprint::from(status);

        match registry.observe(envelope.source, status.mission_type, fingerprint) {
            Observation::Changed => {
                let fired = self.notify(&envelope.source);
                info!(
                    source = %envelope.source,
                    mission_type = %status.mission_type,
                    count = status.total,
                    subscribers = fired,
                    "remote mission changed"
                );
            }
            Observation::Baseline => {
                debug!(source = %envelope.source, mission_type = %status.mission_type, "mission baseline recorded");
            }
            Observation::TransferInFlight => {
                debug!(source = %envelope.source, "mission status ignored during own transfer");
            }
            Observation::Unchanged => {}
        }
    }

    /// Calls every subscriber whose target matches `source`.
    ///
    /// The list is snapshotted first so handlers run without the lock and
    /// may subscribe or unsubscribe.
    fn notify(&self, source: &Target) -> usize {
        let handlers: Vec<ChangeHandler> = self
            .subscribers
            .read()
            .iter()
            .filter(|sub| sub.target.matches(source))
            .map(|sub| Arc::clone(&sub.handler))
            .collect();

        for handler in &handlers {
            handler();
        }
        handlers.len()
    }
}
