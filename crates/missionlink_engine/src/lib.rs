//! # missionlink engine
//!
//! Reliable command and mission transfer over a lossy vehicle link.
//!
//! This crate provides:
//! - Command invocation with acknowledgement matching and retries
//! - Mission list upload, download and clear sessions
//! - Mission-change notifications for edits made by other clients
//! - A per-target registry allowing one operation in flight per target
//! - Blocking and async adapters over callback-style operations
//! - Plugin-facing `Action` and `MissionRaw` wrappers
//!
//! ## Architecture
//!
//! The engine does no I/O of its own. It talks to the link through a
//! [`MessageBus`] and measures deadlines with a [`Timer`], so the same code
//! runs against a real transport on tokio or a simulator on a virtual clock.
//!
//! Each operation is a small state machine driven by three kinds of event:
//! an inbound message, a timer expiry and a cancel request. Whatever an
//! event produces (sends, re-arms, the final result) is carried out after
//! the operation's lock is released, so completions may start new work.
//!
//! ## Key Invariants
//!
//! - At most one operation in flight per target; others fail with `Busy`
//! - Every started operation completes exactly once
//! - Each operation's deadline restarts on every sign of progress
//! - Success is reported only after the remote's final acknowledgement
//! - The engine's own transfers never raise a mission-change event

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod bus;
mod config;
mod driver;
mod engine;
mod error;
mod invoker;
mod notifier;
mod registry;
mod timer;
mod transfer;

pub mod plugins;

pub use bridge::{future, wait, Completion, CompletionFuture, WaitError};
pub use bus::{Filter, Handler, LocalBus, MessageBus, Outbound, SubscriptionId, TransportError};
pub use config::{EngineConfig, RetryPolicy};
pub use engine::Engine;
pub use error::{DenialReason, EngineError, EngineResult};
pub use invoker::CommandRequest;
pub use notifier::{ChangeSubscription, MissionFingerprint};
pub use registry::SlotState;
pub use timer::{Timer, TimerCallback, TimerHandle, TokioTimer};
pub use transfer::{validate_items, DownloadPhase, UploadPhase};
