//! One long-lived streaming connection, parameterized over the two channel
//! flavors (chat and log) so the lifecycle handling exists exactly once.
//!
//! The state machine is pure (`ChannelMachine` maps transport facts to sink
//! effects); the tokio-tungstenite driver around it owns the socket. The
//! channel itself never reconnects — that policy is the session's, layered
//! on as an explicit backoff decorator.

use futures_util::{SinkExt, StreamExt};
use roc_core::wire::{format_chat_line, ChatFrame};
use roc_core::{ChannelState, Credential};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// JSON frames tagged on `type`; requires an `init` handshake on open.
    Chat,
    /// Raw text lines, appended verbatim; no handshake.
    Log,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Chat => "chat",
            ChannelKind::Log => "log",
        }
    }

    fn requires_handshake(self) -> bool {
        matches!(self, ChannelKind::Chat)
    }
}

/// What the sink observes. `State(Open)` clears the sink's prior content;
/// terminal states disable dependent input; `Line` appends and scrolls to
/// the latest entry; `Notice` is a visible marker (error/closure).
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    State(ChannelState),
    Line(String),
    Notice(String),
}

/// Instruction for the driver, produced by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Emit(ChannelEvent),
    SendText(String),
}

pub struct ChannelMachine {
    kind: ChannelKind,
    state: ChannelState,
    credential: Credential,
    display_name: String,
}

impl ChannelMachine {
    pub fn new(kind: ChannelKind, credential: Credential, display_name: String) -> Self {
        Self {
            kind,
            state: ChannelState::Connecting,
            credential,
            display_name,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn on_connected(&mut self) -> Vec<Effect> {
        if self.state.is_terminal() {
            // A close observed before the open wins; never pass through Open.
            return Vec::new();
        }
        self.state = ChannelState::Open;
        let mut effects = vec![Effect::Emit(ChannelEvent::State(ChannelState::Open))];
        if self.kind.requires_handshake() {
            let init = ChatFrame::init(&self.credential, &self.display_name);
            match serde_json::to_string(&init) {
                Ok(frame) => effects.push(Effect::SendText(frame)),
                Err(err) => {
                    warn!(event = "channel_encode_error", channel = self.kind.as_str(), error = %err);
                }
            }
        }
        effects
    }

    /// Decode one inbound frame. Unrecognized or malformed frames are
    /// dropped silently; frames outside `Open` are ignored entirely.
    pub fn on_frame(&self, text: &str) -> Option<ChannelEvent> {
        if self.state != ChannelState::Open {
            return None;
        }
        match self.kind {
            ChannelKind::Log => Some(ChannelEvent::Line(text.to_string())),
            ChannelKind::Chat => match serde_json::from_str::<ChatFrame>(text) {
                Ok(ChatFrame::Message {
                    username,
                    message,
                    timestamp,
                    ..
                }) => Some(ChannelEvent::Line(format_chat_line(
                    &username, &message, timestamp,
                ))),
                Ok(_) => None,
                Err(err) => {
                    warn!(event = "channel_decode_error", channel = self.kind.as_str(), error = %err);
                    None
                }
            },
        }
    }

    pub fn on_error(&mut self, reason: &str) -> Vec<Effect> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.state = ChannelState::Failed;
        vec![
            Effect::Emit(ChannelEvent::State(ChannelState::Failed)),
            Effect::Emit(ChannelEvent::Notice(format!(
                "{} channel error: {reason}",
                self.kind.as_str()
            ))),
        ]
    }

    pub fn on_closed(&mut self) -> Vec<Effect> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.state = ChannelState::Closed;
        vec![
            Effect::Emit(ChannelEvent::State(ChannelState::Closed)),
            Effect::Emit(ChannelEvent::Notice(format!(
                "{} channel closed",
                self.kind.as_str()
            ))),
        ]
    }

    /// Outbound send, chat only. Valid only while `Open`; a no-op when the
    /// text trims to empty. Returns the encoded frame to put on the wire.
    pub fn send(&self, text: &str) -> Option<String> {
        if self.kind != ChannelKind::Chat || self.state != ChannelState::Open {
            return None;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let frame = ChatFrame::message(&self.credential, &self.display_name, trimmed);
        serde_json::to_string(&frame).ok()
    }
}

pub struct StreamChannel {
    pub kind: ChannelKind,
    pub url: Url,
    pub credential: Credential,
    pub display_name: String,
}

/// How one connection attempt ended, for the reconnect decorator.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRun {
    /// The receiving side was still present at exit; reconnecting is useful.
    pub deliverable: bool,
    /// The connection made it to `Open`.
    pub opened: bool,
}

impl StreamChannel {
    /// Drive one connection to termination.
    pub async fn run(
        &self,
        events: &mpsc::Sender<ChannelEvent>,
        outbound: &mut mpsc::Receiver<String>,
    ) -> ChannelRun {
        let mut machine = ChannelMachine::new(
            self.kind,
            self.credential.clone(),
            self.display_name.clone(),
        );
        if events
            .send(ChannelEvent::State(ChannelState::Connecting))
            .await
            .is_err()
        {
            return ChannelRun {
                deliverable: false,
                opened: false,
            };
        }

        let ws = match connect_async(self.url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(err) => {
                warn!(event = "channel_connect_error", channel = self.kind.as_str(), error = %err);
                let deliverable = emit_all(events, machine.on_error(&err.to_string())).await;
                return ChannelRun {
                    deliverable,
                    opened: false,
                };
            }
        };

        drive(ws, machine, events, outbound).await
    }
}

/// Connected-socket phase, separate from the connect call so it runs over
/// any stream.
async fn drive<S>(
    mut ws: WebSocketStream<S>,
    mut machine: ChannelMachine,
    events: &mpsc::Sender<ChannelEvent>,
    outbound: &mut mpsc::Receiver<String>,
) -> ChannelRun
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for effect in machine.on_connected() {
        match effect {
            Effect::Emit(event) => {
                if events.send(event).await.is_err() {
                    let _ = ws.close(None).await;
                    return ChannelRun {
                        deliverable: false,
                        opened: true,
                    };
                }
            }
            Effect::SendText(frame) => {
                // A socket that dies under the handshake is a transport
                // error, not a sink shutdown; the sink must see Failed.
                if ws.send(Message::Text(frame)).await.is_err() {
                    let _ = ws.close(None).await;
                    let deliverable =
                        emit_all(events, machine.on_error("handshake send failed")).await;
                    return ChannelRun {
                        deliverable,
                        opened: true,
                    };
                }
            }
        }
    }

    let mut outbound_open = true;
    loop {
        tokio::select! {
            inbound = ws.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = machine.on_frame(&text) {
                            if events.send(event).await.is_err() {
                                let _ = ws.close(None).await;
                                return ChannelRun { deliverable: false, opened: true };
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let deliverable = emit_all(events, machine.on_closed()).await;
                        return ChannelRun { deliverable, opened: true };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let deliverable =
                            emit_all(events, machine.on_error(&err.to_string())).await;
                        return ChannelRun { deliverable, opened: true };
                    }
                }
            }
            maybe_text = outbound.recv(), if outbound_open => {
                match maybe_text {
                    Some(text) => {
                        if let Some(frame) = machine.send(&text) {
                            if ws.send(Message::Text(frame)).await.is_err() {
                                let deliverable =
                                    emit_all(events, machine.on_error("send failed")).await;
                                return ChannelRun { deliverable, opened: true };
                            }
                        }
                    }
                    None => outbound_open = false,
                }
            }
        }
    }
}

/// Session-level reconnect decorator: exponential backoff, 1 s initial,
/// doubled per failure up to a 30 s cap, reset after a successful open.
/// With `reconnect` off this is a single connection attempt, matching the
/// channel's own no-reconnect contract.
pub async fn run_channel(
    channel: StreamChannel,
    events: mpsc::Sender<ChannelEvent>,
    mut outbound: mpsc::Receiver<String>,
    reconnect: bool,
) {
    let mut backoff = Duration::from_secs(1);
    loop {
        let outcome = channel.run(&events, &mut outbound).await;
        if !outcome.deliverable || !reconnect {
            break;
        }
        if outcome.opened {
            backoff = Duration::from_secs(1);
        }
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

pub(crate) fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(Duration::from_secs(30))
}

/// Forward terminal-transition effects to the sink. Returns false once the
/// receiving side is gone. Terminal transitions never write to the socket.
async fn emit_all(events: &mpsc::Sender<ChannelEvent>, effects: Vec<Effect>) -> bool {
    for effect in effects {
        match effect {
            Effect::Emit(event) => {
                if events.send(event).await.is_err() {
                    return false;
                }
            }
            Effect::SendText(_) => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            identity: "op-1".to_string(),
            token: "secret".to_string(),
        }
    }

    fn chat_machine() -> ChannelMachine {
        ChannelMachine::new(ChannelKind::Chat, credential(), "Operator".to_string())
    }

    fn log_machine() -> ChannelMachine {
        ChannelMachine::new(ChannelKind::Log, credential(), "Operator".to_string())
    }

    #[test]
    fn chat_open_emits_state_then_handshake() {
        let mut machine = chat_machine();
        let effects = machine.on_connected();
        assert_eq!(machine.state(), ChannelState::Open);
        assert_eq!(
            effects[0],
            Effect::Emit(ChannelEvent::State(ChannelState::Open))
        );
        match &effects[1] {
            Effect::SendText(frame) => {
                let value: serde_json::Value = serde_json::from_str(frame).unwrap();
                assert_eq!(value["type"], "init");
                assert_eq!(value["uid"], "op-1");
            }
            other => panic!("expected handshake, got {other:?}"),
        }
    }

    #[test]
    fn log_open_has_no_handshake() {
        let mut machine = log_machine();
        let effects = machine.on_connected();
        assert_eq!(effects.len(), 1);
        assert_eq!(
            effects[0],
            Effect::Emit(ChannelEvent::State(ChannelState::Open))
        );
    }

    #[test]
    fn close_before_open_never_passes_through_open() {
        let mut machine = chat_machine();
        let effects = machine.on_closed();
        assert_eq!(machine.state(), ChannelState::Closed);
        assert_eq!(
            effects[0],
            Effect::Emit(ChannelEvent::State(ChannelState::Closed))
        );
        assert!(matches!(
            effects[1],
            Effect::Emit(ChannelEvent::Notice(_))
        ));

        // A late connect must not reopen the channel...
        assert!(machine.on_connected().is_empty());
        assert_eq!(machine.state(), ChannelState::Closed);
        // ...and sends stay disallowed.
        assert_eq!(machine.send("hello"), None);
    }

    #[test]
    fn chat_message_frame_formats_one_line() {
        let mut machine = chat_machine();
        machine.on_connected();
        let event = machine
            .on_frame(r#"{"type":"message","uid":"9","username":"Bob","message":"hi","timestamp":1700000000000}"#)
            .unwrap();
        match event {
            ChannelEvent::Line(line) => {
                assert!(line.contains("Bob"));
                assert!(line.contains("hi"));
            }
            other => panic!("expected line, got {other:?}"),
        }

        // init frames produce no sink change.
        assert_eq!(
            machine.on_frame(r#"{"type":"init","uid":"9","username":"Bob"}"#),
            None
        );
    }

    #[test]
    fn malformed_and_unknown_frames_are_ignored() {
        let mut machine = chat_machine();
        machine.on_connected();
        assert_eq!(machine.on_frame("not json"), None);
        assert_eq!(machine.on_frame(r#"{"type":"presence"}"#), None);
    }

    #[test]
    fn frames_before_open_are_ignored() {
        let machine = chat_machine();
        assert_eq!(
            machine.on_frame(r#"{"type":"message","username":"Bob","message":"hi"}"#),
            None
        );
    }

    #[test]
    fn log_frames_pass_verbatim() {
        let mut machine = log_machine();
        machine.on_connected();
        assert_eq!(
            machine.on_frame("[boot] world loaded"),
            Some(ChannelEvent::Line("[boot] world loaded".to_string()))
        );
    }

    #[test]
    fn send_is_trimmed_and_gated_on_open() {
        let mut machine = chat_machine();
        assert_eq!(machine.send("hello"), None);

        machine.on_connected();
        assert_eq!(machine.send("   "), None);
        let frame = machine.send("  hello  ").unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["uid"], "op-1");
        assert_eq!(value["username"], "Operator");

        machine.on_error("reset by peer");
        assert_eq!(machine.send("hello"), None);
    }

    #[test]
    fn log_channel_never_sends() {
        let mut machine = log_machine();
        machine.on_connected();
        assert_eq!(machine.send("hello"), None);
    }

    #[test]
    fn error_after_close_is_a_no_op() {
        let mut machine = chat_machine();
        machine.on_closed();
        assert!(machine.on_error("late failure").is_empty());
        assert_eq!(machine.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn handshake_send_failure_fails_the_channel() {
        let (client, server) = tokio::io::duplex(1024);
        // Far end already gone: the init send hits a broken pipe.
        drop(server);
        let ws = WebSocketStream::from_raw_socket(
            client,
            tokio_tungstenite::tungstenite::protocol::Role::Client,
            None,
        )
        .await;

        let (events_tx, mut events) = mpsc::channel(16);
        let (_outbound_tx, mut outbound) = mpsc::channel::<String>(1);
        let machine = chat_machine();
        let outcome = drive(ws, machine, &events_tx, &mut outbound).await;

        assert!(outcome.opened);
        assert!(outcome.deliverable);
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::State(ChannelState::Open))
        );
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::State(ChannelState::Failed))
        );
        assert!(matches!(events.recv().await, Some(ChannelEvent::Notice(_))));
    }

    #[test]
    fn backoff_doubles_to_cap() {
        let mut backoff = Duration::from_secs(1);
        backoff = next_backoff(backoff);
        assert_eq!(backoff, Duration::from_secs(2));
        for _ in 0..10 {
            backoff = next_backoff(backoff);
        }
        assert_eq!(backoff, Duration::from_secs(30));
    }
}
