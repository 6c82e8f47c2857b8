//! Per-target operation registry.
//!
//! Each target owns one slot. A command and a mission transfer are mutually
//! exclusive on the same target; a second request while the slot is taken
//! fails fast with `Busy`. The registry also stores the mission fingerprints
//! the change notifier compares against.
//!
//! The table is guarded by a single mutex. It is never held while sending,
//! scheduling timers, or delivering completions.

use crate::error::{EngineError, EngineResult};
use crate::notifier::{Baseline, MissionFingerprint};
use missionlink_protocol::{MissionType, Target};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identifies one in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct OperationId(u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An operation occupying a slot.
pub(crate) trait ActiveOperation: Send + Sync {
    /// Identity used for conditional release.
    fn id(&self) -> OperationId;

    /// Asks the operation to stop; it completes with `Cancelled`.
    fn cancel(self: Arc<Self>);

    /// Terminates the operation with `error` without further traffic.
    fn abort(self: Arc<Self>, error: EngineError);
}

/// What a target's slot is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing in flight.
    Idle,
    /// A command is in flight.
    Invoking,
    /// A mission upload, download or clear is in flight.
    Transferring,
}

enum Slot {
    Idle,
    Invoking(Arc<dyn ActiveOperation>),
    Transferring(Arc<dyn ActiveOperation>),
}

impl Slot {
    fn state(&self) -> SlotState {
        match self {
            Self::Idle => SlotState::Idle,
            Self::Invoking(_) => SlotState::Invoking,
            Self::Transferring(_) => SlotState::Transferring,
        }
    }

    fn operation(&self) -> Option<&Arc<dyn ActiveOperation>> {
        match self {
            Self::Idle => None,
            Self::Invoking(op) | Self::Transferring(op) => Some(op),
        }
    }
}

struct TargetEntry {
    slot: Slot,
    fingerprints: HashMap<MissionType, MissionFingerprint>,
}

impl TargetEntry {
    fn new() -> Self {
        Self {
            slot: Slot::Idle,
            fingerprints: HashMap::new(),
        }
    }
}

/// Outcome of recording a mission status observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Observation {
    /// First fingerprint for this source and list type.
    Baseline,
    /// Same list as before.
    Unchanged,
    /// The list differs from the last one recorded.
    Changed,
    /// An own transfer is in flight; the observation was not recorded.
    TransferInFlight,
}

pub(crate) struct Registry {
    targets: Mutex<HashMap<Target, TargetEntry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an idle entry for `target` if none exists.
    ///
    /// Returns true if the entry is new.
    pub(crate) fn attach(&self, target: Target) -> bool {
        let mut targets = self.targets.lock();
        if targets.contains_key(&target) {
            return false;
        }
        targets.insert(target, TargetEntry::new());
        true
    }

    /// Removes every entry addressed by `target`.
    ///
    /// Returns the operations that were in flight; the caller aborts them.
    pub(crate) fn detach(&self, target: Target) -> Vec<Arc<dyn ActiveOperation>> {
        let mut targets = self.targets.lock();
        let keys: Vec<Target> = targets
            .keys()
            .filter(|key| **key == target || target.matches(key))
            .copied()
            .collect();

        keys.into_iter()
            .filter_map(|key| targets.remove(&key))
            .filter_map(|entry| entry.slot.operation().cloned())
            .collect()
    }

    /// Removes every entry, returning the operations that were in flight.
    pub(crate) fn drain(&self) -> Vec<Arc<dyn ActiveOperation>> {
        self.targets
            .lock()
            .drain()
            .filter_map(|(_, entry)| entry.slot.operation().cloned())
            .collect()
    }

    /// Occupies the slot of `target`, creating the entry on first use.
    ///
    /// A system-wide target and a component of the same system address the
    /// same vehicle, so an occupied slot on either blocks the other.
    pub(crate) fn claim(
        &self,
        target: Target,
        state: SlotState,
        operation: Arc<dyn ActiveOperation>,
    ) -> EngineResult<()> {
        let mut targets = self.targets.lock();
        let occupied = targets.iter().any(|(key, entry)| {
            !matches!(entry.slot, Slot::Idle) && (key.matches(&target) || target.matches(key))
        });
        if occupied {
            return Err(EngineError::Busy(target));
        }
        let entry = targets.entry(target).or_insert_with(TargetEntry::new);
        entry.slot = match state {
            SlotState::Invoking => Slot::Invoking(operation),
            SlotState::Transferring => Slot::Transferring(operation),
            SlotState::Idle => Slot::Idle,
        };
        Ok(())
    }

    /// Frees the slot if it is still held by `id` and records `baselines`.
    pub(crate) fn release(&self, target: Target, id: OperationId, baselines: &[Baseline]) {
        let mut targets = self.targets.lock();
        if let Some(entry) = targets.get_mut(&target) {
            if entry.slot.operation().is_some_and(|op| op.id() == id) {
                entry.slot = Slot::Idle;
            }
        }
        for baseline in baselines {
            debug!(
                source = %baseline.source,
                mission_type = %baseline.mission_type,
                count = baseline.fingerprint.count,
                "recording mission baseline"
            );
            targets
                .entry(baseline.source)
                .or_insert_with(TargetEntry::new)
                .fingerprints
                .insert(baseline.mission_type, baseline.fingerprint);
        }
    }

    /// Returns the operation occupying the slot of `target`.
    pub(crate) fn active(&self, target: Target) -> Option<Arc<dyn ActiveOperation>> {
        self.targets
            .lock()
            .get(&target)
            .and_then(|entry| entry.slot.operation().cloned())
    }

    pub(crate) fn slot_state(&self, target: Target) -> SlotState {
        self.targets
            .lock()
            .get(&target)
            .map_or(SlotState::Idle, |entry| entry.slot.state())
    }

    /// Compares a status observation from `source` with the stored fingerprint.
    pub(crate) fn observe(
        &self,
        source: Target,
        mission_type: MissionType,
        fingerprint: MissionFingerprint,
    ) -> Observation {
        let mut targets = self.targets.lock();
        let transferring = targets.iter().any(|(key, entry)| {
            matches!(entry.slot, Slot::Transferring(_)) && key.matches(&source)
        });
        if transferring {
            return Observation::TransferInFlight;
        }

        let entry = targets.entry(source).or_insert_with(TargetEntry::new);
        match entry.fingerprints.insert(mission_type, fingerprint) {
            None => Observation::Baseline,
            Some(previous) if previous.differs_from(&fingerprint) => Observation::Changed,
            Some(_) => Observation::Unchanged,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.targets.lock().len()
    }
}
