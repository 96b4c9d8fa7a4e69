//! Bridge host adapter: speaks to the real host shell over a Unix socket.
//!
//! Outbound calls are newline-delimited JSON request/response pairs with
//! short timeouts. Inbound push notifications arrive through the `receive_*`
//! surface, which the embedding shell invokes as raw text; each call is
//! normalized to a boolean acceptance outcome and re-emitted as a local
//! [`HostEvent`]. A malformed payload is rejected locally with the raw text
//! surfaced for diagnostics; no partial state mutation ever occurs.

use std::collections::VecDeque;
use std::env;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use deck_protocol::{
    parse_action_result, BridgeMethod, BridgeRequest, BridgeResponse, CommandOutcome, DeckCommand,
    HostCapabilities, HostState, PipeHealth, ScenesSection, MAX_FRAME_BYTES, PROTOCOL_VERSION,
};

use crate::host::{HostAdapter, HostEvent};

const SOCKET_ENV: &str = "DECK_BRIDGE_SOCKET";
const SIGNAL_FILE_ENV: &str = "DECK_BRIDGE_SIGNAL_FILE";
const SOCKET_DIR: &str = ".relay-deck";
const SOCKET_NAME: &str = "bridge.sock";
const READ_TIMEOUT_MS: u64 = 600;
const WRITE_TIMEOUT_MS: u64 = 600;

pub struct BridgeHost {
    socket_path: PathBuf,
    signal_path: Option<PathBuf>,
    events: VecDeque<HostEvent>,
}

impl BridgeHost {
    /// Resolves paths from the environment, falling back to
    /// `~/.relay-deck/bridge.sock`.
    pub fn from_env() -> Result<Self, String> {
        let socket_path = match env::var(SOCKET_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
                home.join(SOCKET_DIR).join(SOCKET_NAME)
            }
        };
        let signal_path = env::var(SIGNAL_FILE_ENV).ok().map(PathBuf::from);
        Ok(Self::new(socket_path, signal_path))
    }

    pub fn new(socket_path: PathBuf, signal_path: Option<PathBuf>) -> Self {
        Self {
            socket_path,
            signal_path,
            events: VecDeque::new(),
        }
    }

    // ── Inbound surface (host shell → deck) ─────────────────────────────────

    /// The host shell finished wiring its call surface.
    pub fn notify_ready(&mut self) {
        self.events.push_back(HostEvent::Ready);
    }

    /// The state channel handed off to a fallback transport.
    pub fn notify_fallback(&mut self) {
        self.events.push_back(HostEvent::Fallback);
    }

    pub fn receive_ipc_envelope_json(&mut self, json_text: &str) -> bool {
        let accepted = match serde_json::from_str::<Value>(json_text) {
            Ok(value) => value.is_object(),
            Err(err) => {
                warn!(error = %err, raw = json_text, "rejected malformed IPC envelope");
                false
            }
        };
        self.events.push_back(HostEvent::IpcEnvelope { accepted });
        accepted
    }

    pub fn receive_scene_snapshot(&mut self, _payload: &ScenesSection) -> bool {
        self.events
            .push_back(HostEvent::SceneSnapshot { accepted: true });
        true
    }

    pub fn receive_scene_snapshot_json(&mut self, json_text: &str) -> bool {
        let accepted = match serde_json::from_str::<ScenesSection>(json_text) {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, raw = json_text, "rejected malformed scene snapshot");
                false
            }
        };
        self.events.push_back(HostEvent::SceneSnapshot { accepted });
        accepted
    }

    pub fn receive_current_scene(&mut self, scene_name: &str) -> bool {
        let trimmed = scene_name.trim();
        let accepted = !trimmed.is_empty();
        self.events.push_back(HostEvent::CurrentScene {
            accepted,
            scene_name: accepted.then(|| trimmed.to_string()),
        });
        accepted
    }

    pub fn receive_pipe_status(&mut self, status: &str, reason: Option<&str>) -> bool {
        let (accepted, parsed) = match status.to_ascii_lowercase().as_str() {
            "ok" => (true, PipeHealth::Ok),
            "degraded" => (true, PipeHealth::Degraded),
            "down" => (true, PipeHealth::Down),
            other => {
                warn!(status = other, "unrecognized pipe status");
                (false, PipeHealth::Down)
            }
        };
        self.events.push_back(HostEvent::PipeStatus {
            accepted,
            status: parsed,
            reason: reason.map(str::to_string),
        });
        accepted
    }

    pub fn receive_scene_switch_completed(&mut self, _result: &Value) -> bool {
        self.events
            .push_back(HostEvent::SceneSwitchCompleted { accepted: true });
        true
    }

    pub fn receive_scene_switch_completed_json(&mut self, json_text: &str) -> bool {
        let accepted = match serde_json::from_str::<Value>(json_text) {
            Ok(value) => value.is_object(),
            Err(err) => {
                warn!(error = %err, raw = json_text, "rejected malformed scene switch completion");
                false
            }
        };
        self.events
            .push_back(HostEvent::SceneSwitchCompleted { accepted });
        accepted
    }

    pub fn receive_action_result_json(&mut self, json_text: &str) -> bool {
        match parse_action_result(json_text) {
            Ok(result) => {
                self.events.push_back(HostEvent::ActionResult(result));
                true
            }
            Err(err) => {
                warn!(code = %err.code, raw = json_text, "rejected malformed action result");
                false
            }
        }
    }

    // ── Outbound plumbing ───────────────────────────────────────────────────

    fn send_request(&self, request: &BridgeRequest) -> Result<BridgeResponse, String> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .map_err(|err| format!("Failed to connect to bridge socket: {}", err))?;
        let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

        serde_json::to_writer(&mut stream, request)
            .map_err(|err| format!("Failed to write request: {}", err))?;
        stream
            .write_all(b"\n")
            .map_err(|err| format!("Failed to flush request: {}", err))?;
        stream.flush().ok();

        read_response(&mut stream)
    }

    /// Best-effort secondary forwarding path for hosts that cannot receive
    /// structured calls directly: the serialized command is appended to a
    /// signal file the shell tails. Failures are non-fatal.
    fn forward_command_text(&self, json_text: &str) -> bool {
        let Some(path) = &self.signal_path else {
            return false;
        };
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", json_text));
        match appended {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "command text forwarding failed");
                false
            }
        }
    }
}

fn read_response(stream: &mut UnixStream) -> Result<BridgeResponse, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_FRAME_BYTES {
                    return Err("Response exceeded maximum size".to_string());
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                return Err("Timed out waiting for bridge response".to_string());
            }
            Err(err) => return Err(format!("Failed to read response: {}", err)),
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err("Bridge response was empty".to_string());
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| format!("Failed to parse response JSON: {}", err))
}

impl HostAdapter for BridgeHost {
    fn available(&self) -> bool {
        self.socket_path.exists()
    }

    fn pull(&mut self) -> Option<HostState> {
        let request = BridgeRequest {
            protocol_version: PROTOCOL_VERSION,
            method: BridgeMethod::GetState,
            id: None,
            params: None,
        };
        let response = match self.send_request(&request) {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "state pull failed");
                return None;
            }
        };
        let data = response.data?;
        match serde_json::from_value::<HostState>(data) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(error = %err, "bridge returned an unparseable snapshot");
                None
            }
        }
    }

    fn push(&mut self, command: DeckCommand) -> Option<CommandOutcome> {
        let params = match serde_json::to_value(&command) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to serialize command");
                return Some(CommandOutcome::rejected("serialize_failed"));
            }
        };
        self.forward_command_text(&params.to_string());

        let request = BridgeRequest {
            protocol_version: PROTOCOL_VERSION,
            method: BridgeMethod::Command,
            id: command.request_id().map(str::to_string),
            params: Some(params),
        };
        let response = match self.send_request(&request) {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, kind = command.kind(), "command push failed");
                return None;
            }
        };
        if let Some(data) = response.data {
            if let Ok(outcome) = serde_json::from_value::<CommandOutcome>(data) {
                return Some(outcome);
            }
        }
        Some(CommandOutcome {
            ok: response.ok,
            request_id: response.id,
            error: response.error.map(|err| err.code),
        })
    }

    fn take_events(&mut self) -> Vec<HostEvent> {
        self.events.drain(..).collect()
    }

    fn capabilities(&self) -> HostCapabilities {
        let request = BridgeRequest {
            protocol_version: PROTOCOL_VERSION,
            method: BridgeMethod::GetCapabilities,
            id: None,
            params: None,
        };
        if let Ok(response) = self.send_request(&request) {
            if let Some(data) = response.data {
                if let Ok(capabilities) = serde_json::from_value::<HostCapabilities>(data) {
                    return capabilities;
                }
            }
        }
        // No explicit capability report: every command type rides the one
        // generic entry point, so infer full support while the socket exists.
        if self.available() {
            HostCapabilities::full()
        } else {
            HostCapabilities::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!(
            "deck-bridge-{}-{}",
            tag,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn read_request(stream: &mut UnixStream) -> BridgeRequest {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if buffer.contains(&b'\n') {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let end = buffer
            .iter()
            .position(|b| *b == b'\n')
            .unwrap_or(buffer.len());
        serde_json::from_slice(&buffer[..end]).unwrap()
    }

    #[test]
    fn pull_round_trips_a_snapshot_over_the_socket() {
        let dir = scratch_dir("pull");
        let socket_path = dir.join(SOCKET_NAME);
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            assert!(matches!(request.method, BridgeMethod::GetState));
            let mut state = HostState::default();
            state.header.title = "BRIDGED".to_string();
            let response =
                BridgeResponse::ok(None, serde_json::to_value(&state).unwrap());
            let mut payload = serde_json::to_vec(&response).unwrap();
            payload.push(b'\n');
            stream.write_all(&payload).unwrap();
        });

        let mut host = BridgeHost::new(socket_path, None);
        assert!(host.available());
        let state = host.pull().expect("snapshot");
        assert_eq!(state.header.title, "BRIDGED");
        server.join().unwrap();
    }

    #[test]
    fn push_degrades_to_none_when_socket_is_missing() {
        let dir = scratch_dir("missing");
        let mut host = BridgeHost::new(dir.join("nope.sock"), None);
        assert!(!host.available());
        assert!(host.pull().is_none());
        let outcome = host.push(DeckCommand::RequestStatus { request_id: None });
        assert!(outcome.is_none());
    }

    #[test]
    fn push_forwards_command_text_to_the_signal_file() {
        let dir = scratch_dir("signal");
        let signal_path = dir.join("signal.jsonl");
        let mut host = BridgeHost::new(dir.join("nope.sock"), Some(signal_path.clone()));

        host.push(DeckCommand::SwitchScene {
            scene_id: "s1".to_string(),
            scene_name: "Main".to_string(),
            reason: None,
            request_id: Some("dock_1_1".to_string()),
        });

        let written = std::fs::read_to_string(&signal_path).unwrap();
        assert!(written.contains("switch_scene"));
        assert!(written.contains("dock_1_1"));
    }

    #[test]
    fn inbound_surface_normalizes_acceptance() {
        let dir = scratch_dir("inbound");
        let mut host = BridgeHost::new(dir.join("nope.sock"), None);

        assert!(host.receive_scene_snapshot_json(r#"{"items":[],"activeSceneId":null}"#));
        assert!(!host.receive_scene_snapshot_json("{corrupt"));
        assert!(host.receive_pipe_status("degraded", Some("reconnecting")));
        assert!(!host.receive_pipe_status("sideways", None));
        assert!(host.receive_current_scene("Live - Main"));
        assert!(!host.receive_current_scene("   "));
        assert!(host.receive_action_result_json(
            r#"{"actionType":"switch_scene","requestId":"dock_1_1","status":"completed"}"#
        ));
        assert!(!host.receive_action_result_json("nope"));

        let events = host.take_events();
        assert_eq!(events.len(), 7, "malformed action result emits no event");
        assert!(matches!(
            events[0],
            HostEvent::SceneSnapshot { accepted: true }
        ));
        assert!(matches!(
            events[1],
            HostEvent::SceneSnapshot { accepted: false }
        ));
        assert!(matches!(
            events[2],
            HostEvent::PipeStatus {
                accepted: true,
                status: PipeHealth::Degraded,
                ..
            }
        ));
        assert!(host.take_events().is_empty());
    }

    #[test]
    fn command_error_response_maps_to_outcome() {
        let dir = scratch_dir("err");
        let socket_path = dir.join(SOCKET_NAME);
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = BridgeResponse::error(
                request.id,
                "unsupported_action_type",
                "host cannot switch scenes",
            );
            let mut payload = serde_json::to_vec(&response).unwrap();
            payload.push(b'\n');
            stream.write_all(&payload).unwrap();
        });

        let mut host = BridgeHost::new(socket_path, None);
        let outcome = host
            .push(DeckCommand::SetMode {
                mode: "irl".to_string(),
                request_id: Some("dock_2_1".to_string()),
            })
            .expect("outcome");
        assert!(!outcome.ok);
        assert_eq!(outcome.error.as_deref(), Some("unsupported_action_type"));
        assert_eq!(outcome.request_id.as_deref(), Some("dock_2_1"));
        server.join().unwrap();
    }
}
