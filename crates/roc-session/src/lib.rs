//! Live-state synchronization engine for one dashboard session: a poll
//! aggregator over four independently-failing HTTP sources, two stream
//! channels (chat and log), and the administrative one-shots, composed
//! behind a handle the render side consumes.

use roc_core::wire::{BroadcastBody, LogBody};
use roc_core::{ChannelState, Credential, ViewModel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

pub mod channel;
pub mod poller;
pub mod transport;

pub use channel::{ChannelEvent, ChannelKind, StreamChannel};
pub use transport::{Transport, TransportError};

pub const LOG_PATH: &str = "/admin/log";
pub const BROADCAST_PATH: &str = "/admin/broadcast";
pub const RESTART_PATH: &str = "/admin/restart";

const EVENT_QUEUE_CAPACITY: usize = 256;
const CHAT_OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: Url,
    pub chat_url: Url,
    pub log_url: Url,
    pub credential: Credential,
    pub display_name: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub reconnect: bool,
}

/// Consumer side of one running session. The receivers are the render
/// sink's feed; dropping them (or calling `stop`) ends the session, and any
/// in-flight poll settles and is dropped.
pub struct SessionHandle {
    pub views: mpsc::Receiver<ViewModel>,
    pub chat_events: mpsc::Receiver<ChannelEvent>,
    pub log_events: mpsc::Receiver<ChannelEvent>,
    pub notices: mpsc::Receiver<String>,
    chat_outbound: mpsc::Sender<String>,
    notice_tx: mpsc::Sender<String>,
    transport: Arc<Transport>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Session;

impl Session {
    /// Establish both stream channels and begin periodic polling.
    pub fn start(config: SessionConfig) -> Result<SessionHandle, TransportError> {
        let transport = Arc::new(Transport::new(
            config.base_url.clone(),
            &config.credential,
            config.request_timeout,
        )?);

        let (view_tx, views) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (chat_tx, chat_events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (log_tx, log_events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (notice_tx, notices) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (chat_outbound, chat_outbound_rx) = mpsc::channel(CHAT_OUTBOUND_CAPACITY);
        // The log channel has no outbound side; its sender drops here.
        let (_, log_outbound_rx) = mpsc::channel(1);

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(poller::run(
            transport.clone(),
            config.poll_interval,
            view_tx,
        )));

        let chat_channel = StreamChannel {
            kind: ChannelKind::Chat,
            url: config.chat_url.clone(),
            credential: config.credential.clone(),
            display_name: config.display_name.clone(),
        };
        tasks.push(tokio::spawn(channel::run_channel(
            chat_channel,
            chat_tx,
            chat_outbound_rx,
            config.reconnect,
        )));

        let log_channel = StreamChannel {
            kind: ChannelKind::Log,
            url: config.log_url.clone(),
            credential: config.credential.clone(),
            display_name: config.display_name.clone(),
        };
        tasks.push(tokio::spawn(run_log_channel(
            log_channel,
            transport.clone(),
            log_tx,
            log_outbound_rx,
            config.reconnect,
        )));

        info!(
            event = "session_started",
            base = %config.base_url,
            poll_interval_secs = config.poll_interval.as_secs(),
            reconnect = config.reconnect,
        );

        Ok(SessionHandle {
            views,
            chat_events,
            log_events,
            notices,
            chat_outbound,
            notice_tx,
            transport,
            tasks,
        })
    }
}

impl SessionHandle {
    /// Queue one outbound chat message. Validity (channel open, non-empty
    /// after trimming) is enforced at the channel; a full queue drops the
    /// message rather than blocking the render loop.
    pub fn send_chat(&self, text: &str) {
        let _ = self.chat_outbound.try_send(text.to_string());
    }

    /// Fire-and-forget `POST /admin/broadcast`. The outcome lands on the
    /// notice feed; session state is unaffected either way.
    pub fn broadcast(&self, message: String) {
        let transport = self.transport.clone();
        let notices = self.notice_tx.clone();
        tokio::spawn(async move {
            let body = BroadcastBody { message };
            let note = match transport.post_json(BROADCAST_PATH, Some(&body)).await {
                Ok(()) => "broadcast sent".to_string(),
                Err(err) => format!("broadcast failed: {err}"),
            };
            let _ = notices.send(note).await;
        });
    }

    /// Fire-and-forget `POST /admin/restart`.
    pub fn restart(&self) {
        let transport = self.transport.clone();
        let notices = self.notice_tx.clone();
        tokio::spawn(async move {
            let note = match transport.post_json::<()>(RESTART_PATH, None).await {
                Ok(()) => "restart requested".to_string(),
                Err(err) => format!("restart failed: {err}"),
            };
            let _ = notices.send(note).await;
        });
    }

    /// Stop polling and close both channel connections. In-flight requests
    /// settle on their own and their results are discarded.
    pub fn stop(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(event = "session_stopped");
    }
}

/// Log-channel wrapper: after the channel first opens (which clears the
/// sink), replay the server's retained log once via `GET /admin/log`, then
/// let the live stream take over.
async fn run_log_channel(
    channel: StreamChannel,
    transport: Arc<Transport>,
    events: mpsc::Sender<ChannelEvent>,
    outbound: mpsc::Receiver<String>,
    reconnect: bool,
) {
    let (inner_tx, mut inner_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let driver = tokio::spawn(channel::run_channel(
        channel, inner_tx, outbound, reconnect,
    ));

    let mut backfilled = false;
    while let Some(event) = inner_rx.recv().await {
        let opened = event == ChannelEvent::State(ChannelState::Open);
        if events.send(event).await.is_err() {
            break;
        }
        if opened && !backfilled {
            backfilled = true;
            if let Some(body) = transport.fetch_json::<LogBody>(LOG_PATH).await {
                for line in body.lines {
                    if events.send(ChannelEvent::Line(line)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    driver.abort();
}
