//! # deck-core
//!
//! Coordination core for the relay deck: the client-side control surface of a
//! live-streaming relay/failover appliance. A host process owns the real
//! telemetry, scene inventory, and failover state machine; this crate keeps a
//! local view of that state fresh over an imperfect push/pull channel,
//! correlates fire-and-forget commands with their asynchronous results, and
//! decides, under hysteresis and mutual exclusion with manual control, when
//! to auto-switch scenes from a noisy bitrate signal.
//!
//! ## Design Principles
//!
//! - **Synchronous**: no async runtime. The embedding client drives
//!   [`DeckEngine::tick`] from its own loop.
//! - **Not thread-safe**: callers provide their own synchronization.
//! - **Graceful degradation**: an unreachable host degrades the affected
//!   slice (stale snapshot, dropped command) and never panics the process.
//! - **Deterministic time**: every deadline flows through [`clock::Clock`],
//!   so tests advance a [`clock::ManualClock`] instead of sleeping.

pub mod autoswitch;
pub mod clock;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod gate;
pub mod host;
pub mod links;
pub mod metrics;
pub mod prefs;
pub mod rules;
pub mod snapshot;
pub mod sync;

pub use autoswitch::{select_rule, SwitchDecision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use correlator::{ActionCorrelator, InFlightAction};
pub use engine::DeckEngine;
pub use error::{DeckError, Result};
pub use gate::ActionGate;
pub use host::{bridge::BridgeHost, sim::SimHost, HostAdapter, HostEvent};
pub use links::SceneIntentLinks;
pub use metrics::{OutputHealth, RollingMaxTracker};
pub use prefs::PrefsBridge;
pub use rules::RuleSet;
pub use snapshot::{resolve_arm_state, ArmSource, ArmState};
pub use sync::StateSynchronizer;
