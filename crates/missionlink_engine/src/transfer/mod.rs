//! Mission transfer sessions.
//!
//! Uploads and downloads share one handshake shape: announce or request the
//! item count, move items one request at a time, close with an
//! acknowledgement. Every step restarts the deadline; silence resends the
//! last artifact until the retry budget is spent.

mod clear;
mod download;
mod upload;

pub(crate) use clear::ClearExchange;
pub(crate) use download::DownloadExchange;
pub use download::DownloadPhase;
pub(crate) use upload::UploadExchange;
pub use upload::UploadPhase;

use crate::bus::Filter;
use crate::error::{EngineError, EngineResult};
use missionlink_protocol::{Envelope, MissionItem, MissionType};

/// Filter accepting messages about `mission_type`.
pub(crate) fn for_list(mission_type: MissionType) -> Filter {
    Box::new(move |env: &Envelope| env.message.mission_type() == Some(mission_type))
}

/// Checks a list before anything is sent.
///
/// Sequence numbers must run 0..n without gaps and every item must belong
/// to `mission_type`.
pub fn validate_items(mission_type: MissionType, items: &[MissionItem]) -> EngineResult<()> {
    if !mission_type.is_transferable() {
        return Err(EngineError::invalid(format!(
            "mission type {mission_type} cannot be transferred"
        )));
    }
    if items.len() > usize::from(u16::MAX) {
        return Err(EngineError::invalid(format!(
            "{} items exceed the protocol limit",
            items.len()
        )));
    }
    for (index, item) in items.iter().enumerate() {
        if usize::from(item.seq) != index {
            return Err(EngineError::invalid(format!(
                "item at position {index} has sequence number {}",
                item.seq
            )));
        }
        if item.mission_type != mission_type {
            return Err(EngineError::invalid(format!(
                "item {index} belongs to {}, not {mission_type}",
                item.mission_type
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::driver::{Step, Steps};
    use crate::error::EngineResult;
    use missionlink_protocol::{
        CommandCode, Envelope, Message, MissionFrame, MissionItem, Target,
    };

    pub fn items(n: u16) -> Vec<MissionItem> {
        (0..n)
            .map(|seq| {
                let mut item = MissionItem::new(
                    seq,
                    MissionFrame::GLOBAL_RELATIVE_ALT_INT,
                    CommandCode::NAV_WAYPOINT,
                );
                item.x = 473_977_420 + i32::from(seq);
                item.y = 85_455_940;
                item.z = 10.0;
                item
            })
            .collect()
    }

    pub fn from_vehicle(message: Message) -> Envelope {
        Envelope::new(Target::component(1, 1), message)
    }

    pub fn sent<T>(steps: &Steps<T>) -> Vec<Message> {
        steps
            .iter()
            .filter_map(|s| match s {
                Step::Send(m) | Step::Notify(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn finished<T>(steps: Steps<T>) -> Option<EngineResult<T>> {
        steps.into_iter().find_map(|s| match s {
            Step::Finish(result) => Some(result),
            _ => None,
        })
    }
}
