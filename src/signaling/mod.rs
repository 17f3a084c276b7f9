pub mod message;

pub use message::SignalingMessage;

use crate::error::SignalingError;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use url::Url;

/// How long the socket task spends flushing the close frame. `close`
/// waits at most twice this before aborting the task.
const CLOSE_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// What the channel reports to its owner, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    Open,
    Message(SignalingMessage),
    /// A frame that could not be parsed. The channel stays open.
    ProtocolViolation(String),
    /// Connect failure or transport error. No events follow.
    Error(String),
    /// The remote side went away. No events follow.
    Closed,
}

/// One WebSocket connection to the interview endpoint.
///
/// The socket is driven by a background task; `send` only enqueues, and
/// inbound traffic is surfaced through `next_event`.
pub struct SignalingChannel {
    url: Url,
    state: watch::Receiver<ChannelState>,
    outbound: Option<mpsc::UnboundedSender<SignalingMessage>>,
    events: mpsc::UnboundedReceiver<SignalingEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl SignalingChannel {
    /// Starts connecting to `url`. The outcome is reported as the first
    /// event: `Open` or `Error`.
    pub fn open(url: Url, connect_timeout: Duration) -> Self {
        let (state_tx, state) = watch::channel(ChannelState::Connecting);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tracing::debug!(target: "signaling", %url, "connecting");
        let task = tokio::spawn(drive(
            url.clone(),
            connect_timeout,
            state_tx,
            out_rx,
            event_tx,
            shutdown_rx,
        ));

        Self {
            url,
            state,
            outbound: Some(out_tx),
            events,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            closed: false,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        if self.closed {
            ChannelState::Closed
        } else {
            *self.state.borrow()
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Queues `message` for delivery. Fails with `NotOpen` unless the
    /// channel is open.
    pub fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        if !self.is_open() {
            return Err(SignalingError::NotOpen);
        }
        let outbound = self.outbound.as_ref().ok_or(SignalingError::NotOpen)?;
        tracing::debug!(target: "signaling", kind = message.kind(), "queued outbound message");
        outbound.send(message).map_err(|_| SignalingError::NotOpen)
    }

    /// Next event, or `None` once the channel is closed and drained.
    pub async fn next_event(&mut self) -> Option<SignalingEvent> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }

    /// An event that has already arrived, without waiting.
    pub fn try_next_event(&mut self) -> Option<SignalingEvent> {
        if self.closed {
            return None;
        }
        self.events.try_recv().ok()
    }

    /// Closes the socket and drops anything still queued. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.outbound = None;
        self.events.close();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if timeout(CLOSE_GRACE * 2, &mut task).await.is_err() {
                task.abort();
            }
        }
        tracing::debug!(target: "signaling", url = %self.url, "channel closed");
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn drive(
    url: Url,
    connect_timeout: Duration,
    state: watch::Sender<ChannelState>,
    mut outbound: mpsc::UnboundedReceiver<SignalingMessage>,
    events: mpsc::UnboundedSender<SignalingEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connect = timeout(connect_timeout, connect_async(url.as_str()));
    let ws = tokio::select! {
        biased;
        _ = &mut shutdown => {
            state.send_replace(ChannelState::Closed);
            return;
        }
        result = connect => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(err)) => {
                fail(&state, &events, SignalingError::Connect(err.to_string()));
                return;
            }
            Err(_) => {
                let reason = format!("timed out after {}s", connect_timeout.as_secs_f64());
                fail(&state, &events, SignalingError::Connect(reason));
                return;
            }
        }
    };

    tracing::info!(target: "signaling", %url, "channel open");
    state.send_replace(ChannelState::Open);
    let _ = events.send(SignalingEvent::Open);

    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                let _ = timeout(CLOSE_GRACE, write.close()).await;
                state.send_replace(ChannelState::Closed);
                return;
            }
            outgoing = outbound.recv() => {
                let Some(message) = outgoing else {
                    let _ = timeout(CLOSE_GRACE, write.close()).await;
                    remote_closed(&state, &events);
                    return;
                };
                let text = match message.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(target: "signaling", error = %err, "dropping unencodable message");
                        continue;
                    }
                };
                tracing::trace!(target: "signaling", %text, "sending");
                if let Err(err) = write.send(Message::Text(text)).await {
                    fail(&state, &events, SignalingError::Socket(err.to_string()));
                    return;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => deliver(&events, &text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => deliver(&events, &text),
                    Err(_) => {
                        tracing::warn!(target: "signaling", "binary frame is not utf-8");
                        let _ = events.send(SignalingEvent::ProtocolViolation(
                            "binary frame is not utf-8".into(),
                        ));
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(target: "signaling", ?frame, "close frame received");
                    remote_closed(&state, &events);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(
                    WsError::ConnectionClosed
                    | WsError::AlreadyClosed
                    | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
                ))
                | None => {
                    remote_closed(&state, &events);
                    return;
                }
                Some(Err(err)) => {
                    fail(&state, &events, SignalingError::Socket(err.to_string()));
                    return;
                }
            }
        }
    }
}

fn deliver(events: &mpsc::UnboundedSender<SignalingEvent>, text: &str) {
    match SignalingMessage::decode(text) {
        Ok(message) => {
            tracing::debug!(target: "signaling", kind = message.kind(), "received message");
            let _ = events.send(SignalingEvent::Message(message));
        }
        Err(err) => {
            tracing::warn!(target: "signaling", error = %err, payload = %text, "ignoring malformed message");
            let _ = events.send(SignalingEvent::ProtocolViolation(err.to_string()));
        }
    }
}

fn remote_closed(state: &watch::Sender<ChannelState>, events: &mpsc::UnboundedSender<SignalingEvent>) {
    tracing::info!(target: "signaling", "channel closed by remote");
    state.send_replace(ChannelState::Closed);
    let _ = events.send(SignalingEvent::Closed);
}

fn fail(
    state: &watch::Sender<ChannelState>,
    events: &mpsc::UnboundedSender<SignalingEvent>,
    err: SignalingError,
) {
    tracing::warn!(target: "signaling", error = %err, "channel error");
    state.send_replace(ChannelState::Errored);
    let _ = events.send(SignalingEvent::Error(err.to_string()));
}
