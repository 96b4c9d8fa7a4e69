//! Host adapter boundary.
//!
//! Two implementations exist side by side: [`bridge::BridgeHost`] speaks to a
//! real host shell over a socket, [`sim::SimHost`] is a self-contained
//! simulator. The rest of the deck is identical against either.

pub mod bridge;
pub mod sim;

use deck_protocol::{ActionResult, CommandOutcome, DeckCommand, HostCapabilities, HostState, PipeHealth};

/// Narrow, swappable interface to the external host.
///
/// `pull` must be safe to call at high frequency (idempotent, side-effect
/// free) and returns `None` when the transport cannot be reached; callers
/// keep operating on the last known state. `push` returns the immediate
/// outcome, or `None` when the transport is missing entirely; asynchronous
/// results for accepted commands arrive later through [`take_events`],
/// correlated by request id.
///
/// [`take_events`]: HostAdapter::take_events
pub trait HostAdapter {
    fn available(&self) -> bool;
    fn pull(&mut self) -> Option<HostState>;
    fn push(&mut self, command: DeckCommand) -> Option<CommandOutcome>;
    /// Drains pending push notifications. Called once per engine tick.
    fn take_events(&mut self) -> Vec<HostEvent>;
    fn capabilities(&self) -> HostCapabilities;
}

/// A push notification from the host, normalized to an acceptance flag plus
/// payload. One event type with a reason tag keeps the fan-in to the shared
/// refresh handler auditable.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The host shell finished wiring its call surface.
    Ready,
    /// The state channel handed off to a fallback transport.
    Fallback,
    /// A raw IPC envelope arrived.
    IpcEnvelope { accepted: bool },
    /// A scene inventory snapshot arrived.
    SceneSnapshot { accepted: bool },
    /// The active scene changed.
    CurrentScene {
        accepted: bool,
        scene_name: Option<String>,
    },
    /// Transport/pipe health changed.
    PipeStatus {
        accepted: bool,
        status: PipeHealth,
        reason: Option<String>,
    },
    /// A scene switch reached its terminal state.
    SceneSwitchCompleted { accepted: bool },
    /// Correlated result for a previously pushed command.
    ActionResult(ActionResult),
}

impl HostEvent {
    /// Stable reason tag for logging and refresh attribution.
    pub fn reason(&self) -> &'static str {
        match self {
            HostEvent::Ready => "ready",
            HostEvent::Fallback => "fallback",
            HostEvent::IpcEnvelope { .. } => "ipc_envelope",
            HostEvent::SceneSnapshot { .. } => "scene_snapshot",
            HostEvent::CurrentScene { .. } => "current_scene",
            HostEvent::PipeStatus { .. } => "pipe_status",
            HostEvent::SceneSwitchCompleted { .. } => "scene_switch_completed",
            HostEvent::ActionResult(_) => "action_result",
        }
    }
}
