//! Lossy simulated link.
//!
//! [`SimLink`] carries CBOR-encoded frames between the engine's bus and a
//! [`SimVehicle`]. Traffic sits in two queues until the harness pumps it,
//! so nothing is ever delivered from inside a send. Frames can be dropped
//! by explicit rules or by a seeded random loss model.

use crate::vehicle::SimVehicle;
use bytes::Bytes;
use missionlink_engine::{LocalBus, Outbound, TransportError};
use missionlink_protocol::{decode_frame, encode_frame, Frame, Message, MessageKind, Target};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use tracing::{trace, warn};

/// Direction of travel on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ground to vehicle.
    Uplink,
    /// Vehicle to ground.
    Downlink,
}

/// Drops the next `remaining` matching frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropRule {
    /// Direction the rule applies to.
    pub direction: Direction,
    /// Message kind to drop; `None` matches every kind.
    pub kind: Option<MessageKind>,
    /// Frames left to drop.
    pub remaining: u32,
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames queued towards the vehicle.
    pub uplink_sent: u64,
    /// Frames dropped towards the vehicle.
    pub uplink_dropped: u64,
    /// Frames queued towards the ground.
    pub downlink_sent: u64,
    /// Frames dropped towards the ground.
    pub downlink_dropped: u64,
}

struct LinkState {
    uplink: VecDeque<Bytes>,
    downlink: VecDeque<Bytes>,
    rules: Vec<DropRule>,
    loss: f64,
    rng: StdRng,
    fail_sends: bool,
    stats: LinkStats,
}

impl LinkState {
    fn should_drop(&mut self, direction: Direction, kind: MessageKind) -> bool {
        let rule = self.rules.iter_mut().find(|rule| {
            rule.remaining > 0
                && rule.direction == direction
                && rule.kind.map_or(true, |k| k == kind)
        });
        if let Some(rule) = rule {
            rule.remaining -= 1;
            return true;
        }
        self.loss > 0.0 && self.rng.gen_bool(self.loss)
    }

    fn push(&mut self, direction: Direction, frame: &Frame) {
        let kind = frame.message.kind();
        let dropped = self.should_drop(direction, kind);
        let counters = match direction {
            Direction::Uplink => (&mut self.stats.uplink_sent, &mut self.stats.uplink_dropped),
            Direction::Downlink => (
                &mut self.stats.downlink_sent,
                &mut self.stats.downlink_dropped,
            ),
        };
        if dropped {
            *counters.1 += 1;
            trace!(?direction, ?kind, "frame dropped");
            return;
        }
        *counters.0 += 1;

        match encode_frame(frame) {
            Ok(bytes) => match direction {
                Direction::Uplink => self.uplink.push_back(bytes),
                Direction::Downlink => self.downlink.push_back(bytes),
            },
            Err(err) => warn!(error = %err, "failed to encode frame"),
        }
    }
}

/// Queue-based link between the engine and a simulated vehicle.
pub struct SimLink {
    ground: Target,
    vehicle: Target,
    state: Mutex<LinkState>,
}

impl SimLink {
    /// Creates a lossless link.
    pub fn new(ground: Target, vehicle: Target, seed: u64) -> Self {
        Self {
            ground,
            vehicle,
            state: Mutex::new(LinkState {
                uplink: VecDeque::new(),
                downlink: VecDeque::new(),
                rules: Vec::new(),
                loss: 0.0,
                rng: StdRng::seed_from_u64(seed),
                fail_sends: false,
                stats: LinkStats::default(),
            }),
        }
    }

    /// Sets the probability of losing any one frame, in both directions.
    pub fn set_loss(&self, probability: f64) {
        self.state.lock().loss = probability.clamp(0.0, 1.0);
    }

    /// Drops the next `count` frames of `kind` travelling in `direction`.
    pub fn drop_next(&self, direction: Direction, kind: Option<MessageKind>, count: u32) {
        self.state.lock().rules.push(DropRule {
            direction,
            kind,
            remaining: count,
        });
    }

    /// Makes every send fail at the transport boundary.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Traffic counters.
    pub fn stats(&self) -> LinkStats {
        self.state.lock().stats
    }

    /// Returns true if no frame is waiting in either direction.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.uplink.is_empty() && state.downlink.is_empty()
    }

    /// Queues an unsolicited vehicle message, such as a status broadcast.
    pub fn inject(&self, message: Message) {
        let frame = Frame::new(self.vehicle, self.ground, message);
        self.state.lock().push(Direction::Downlink, &frame);
    }

    /// Moves queued traffic once in each direction.
    ///
    /// Uplink frames are handed to `vehicle`, whose replies are queued on
    /// the downlink; downlink frames are delivered to `bus`. Returns the
    /// number of frames moved.
    pub fn pump_once(&self, vehicle: &SimVehicle, bus: &LocalBus) -> usize {
        let uplink: Vec<Bytes> = self.state.lock().uplink.drain(..).collect();
        for bytes in &uplink {
            let Some(frame) = decode(bytes) else { continue };
            for reply in vehicle.handle(&frame.message) {
                let reply = Frame::new(self.vehicle, frame.source, reply);
                self.state.lock().push(Direction::Downlink, &reply);
            }
        }

        let downlink: Vec<Bytes> = self.state.lock().downlink.drain(..).collect();
        for bytes in &downlink {
            if let Some(frame) = decode(bytes) {
                bus.deliver(&frame.into_envelope());
            }
        }
        uplink.len() + downlink.len()
    }
}

fn decode(bytes: &[u8]) -> Option<Frame> {
    match decode_frame(bytes) {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!(error = %err, "dropping undecodable frame");
            None
        }
    }
}

impl Outbound for SimLink {
    fn transmit(&self, target: Target, message: Message) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(TransportError::new("simulated link is down"));
        }
        let frame = Frame::new(self.ground, target, message);
        state.push(Direction::Uplink, &frame);
        Ok(())
    }
}

impl std::fmt::Debug for SimLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimLink")
            .field("ground", &self.ground)
            .field("vehicle", &self.vehicle)
            .field("stats", &self.stats())
            .finish()
    }
}
