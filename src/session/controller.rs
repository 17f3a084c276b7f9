use crate::config::SessionConfig;
use crate::error::{ConfigError, SessionError};
use crate::media::{DeviceCapture, SyntheticCapture};
use crate::peer::{
    IceCandidate, PeerConnector, PeerTransportController, TransportState, WebRtcConnector,
};
use crate::session::attempt::Attempt;
use crate::session::id::{Identity, SessionId};
use crate::session::status::{SessionStatus, StatusPublisher};
use crate::signaling::{SignalingChannel, SignalingEvent, SignalingMessage};
use crate::utils::random_id;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;
use url::Url;

/// Drives one interview session from capture to a connected transport.
///
/// Built with the session id and configuration, optionally given an
/// identity and capture/transport backends, then consumed by `start`.
pub struct SessionController {
    session_id: SessionId,
    config: SessionConfig,
    endpoint: Url,
    identity: Option<Identity>,
    capture: Arc<dyn DeviceCapture>,
    connector: Arc<dyn PeerConnector>,
}

impl SessionController {
    pub fn new(session_id: SessionId, config: SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let endpoint = config.endpoint(&session_id)?;
        let connector = WebRtcConnector::new(config.gather_timeout);
        Ok(Self {
            session_id,
            config,
            endpoint,
            identity: None,
            capture: Arc::new(SyntheticCapture::default()),
            connector: Arc::new(connector),
        })
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_capture(mut self, capture: Arc<dyn DeviceCapture>) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn PeerConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// `{base}/ws/interview/{session_id}`
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Spawns the session. Must be called inside a tokio runtime.
    pub fn start(self) -> SessionHandle {
        let (status, current, history) = StatusPublisher::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let attempt_id = random_id();

        let span = tracing::info_span!(
            target: "session",
            "session",
            session_id = %self.session_id,
            attempt = %attempt_id
        );
        let driver = Driver {
            config: self.config,
            endpoint: self.endpoint,
            identity: self.identity,
            capture: self.capture,
            connector: self.connector,
            status,
            cancel: cancel_rx,
        };
        let task = tokio::spawn(driver.run().instrument(span));

        SessionHandle {
            session_id: self.session_id,
            current,
            history,
            cancel: cancel_tx,
            task: Some(task),
        }
    }
}

/// Caller side of a started session. Dropping it cancels the session.
pub struct SessionHandle {
    session_id: SessionId,
    current: watch::Receiver<SessionStatus>,
    history: mpsc::UnboundedReceiver<SessionStatus>,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        self.current.borrow().clone()
    }

    /// Every transition in publication order, starting with `Idle`.
    /// Yields `None` after the terminal status has been taken.
    pub async fn next_status(&mut self) -> Option<SessionStatus> {
        self.history.recv().await
    }

    /// Resolves with the terminal status once every resource is released.
    pub async fn wait_terminal(&self) -> SessionStatus {
        let mut current = self.current.clone();
        let terminal = match current.wait_for(SessionStatus::is_terminal).await {
            Ok(status) => status.clone(),
            // publisher gone without a terminal status: the driver panicked
            Err(_) => SessionStatus::Failed(SessionError::TransportFailed(
                "session task ended unexpectedly".into(),
            )),
        };
        terminal
    }

    /// Requests cancellation. Repeated calls have no further effect.
    pub fn cancel(&self) {
        let first = !self.cancel.send_replace(true);
        if first {
            tracing::info!(target: "session", session_id = %self.session_id, "cancel requested");
        }
    }

    /// Cancels and waits for the session to finish tearing down.
    pub async fn close(mut self) -> SessionStatus {
        self.cancel();
        let terminal = self.wait_terminal().await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        terminal
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

enum Halt {
    Cancelled,
    Failed(SessionError),
}

impl From<SessionError> for Halt {
    fn from(err: SessionError) -> Self {
        Halt::Failed(err)
    }
}

struct Driver {
    config: SessionConfig,
    endpoint: Url,
    identity: Option<Identity>,
    capture: Arc<dyn DeviceCapture>,
    connector: Arc<dyn PeerConnector>,
    status: StatusPublisher,
    cancel: watch::Receiver<bool>,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt = Attempt::default();
        let halt = match self.drive(&mut attempt).await {
            Ok(never) => match never {},
            Err(halt) => halt,
        };

        attempt.teardown(self.capture.as_ref()).await;
        let terminal = match halt {
            Halt::Cancelled => SessionStatus::Closed,
            Halt::Failed(reason) => SessionStatus::Failed(reason),
        };
        self.status.publish(terminal);
    }

    /// Runs until the session fails or is cancelled; a `Ready` session
    /// stays in here until then.
    async fn drive(&mut self, attempt: &mut Attempt) -> Result<Infallible, Halt> {
        if self.config.require_identity && self.identity.is_none() {
            return Err(SessionError::Unauthorized.into());
        }
        if *self.cancel.borrow() {
            return Err(Halt::Cancelled);
        }

        self.status.publish(SessionStatus::AcquiringMedia);
        let media = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => return Err(Halt::Cancelled),
            result = self.capture.acquire() => result.map_err(SessionError::from)?,
        };
        tracing::debug!(target: "media", tracks = media.tracks().len(), "capture granted");
        let media = attempt.media.insert(media);

        self.status.publish(SessionStatus::ChannelConnecting);
        let channel = attempt.channel.insert(SignalingChannel::open(
            self.endpoint.clone(),
            self.config.connect_timeout,
        ));
        loop {
            let event = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => return Err(Halt::Cancelled),
                event = channel.next_event() => event,
            };
            match event {
                Some(SignalingEvent::Open) => break,
                Some(SignalingEvent::Error(reason)) => {
                    return Err(SessionError::ChannelError(reason).into())
                }
                Some(SignalingEvent::Closed) | None => {
                    return Err(SessionError::ChannelError("channel closed before opening".into()).into())
                }
                Some(other) => tracing::debug!(target: "signaling", ?other, "event before open"),
            }
        }

        self.status.publish(SessionStatus::Negotiating);
        // not raced against cancel: every built connection must land in the
        // attempt so teardown closes it
        let transport =
            PeerTransportController::create(self.connector.as_ref(), &self.config.ice_servers)
                .await
                .map_err(|err| SessionError::TransportFailed(err.to_string()))?;
        let transport = attempt.transport.insert(transport);
        transport.attach(media).await.map_err(SessionError::from)?;

        // the channel is watched while the offer is built so a premature
        // answer or a dropped socket is noticed; channel events win ties
        let mut early_candidates = Vec::new();
        let offer = {
            let offer = transport.create_offer();
            tokio::pin!(offer);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled(&mut self.cancel) => return Err(Halt::Cancelled),
                    event = channel.next_event() => before_offer_sent(event, &mut early_candidates)?,
                    result = &mut offer => break result.map_err(SessionError::from)?,
                }
            }
        };
        // anything delivered while the offer completed still predates it
        while let Some(event) = channel.try_next_event() {
            before_offer_sent(Some(event), &mut early_candidates)?;
        }

        channel
            .send(SignalingMessage::offer(offer.sdp))
            .map_err(SessionError::from)?;
        tracing::info!(target: "session", "offer sent");
        for candidate in early_candidates {
            if let Err(err) = transport.add_remote_candidate(candidate).await {
                tracing::warn!(target: "peer", error = %err, "failed to queue early candidate");
            }
        }

        let mut answered = false;
        let mut connected = false;
        while !(answered && connected) {
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => return Err(Halt::Cancelled),
                state = transport.next_state() => match state {
                    Some(TransportState::Connected) => connected = true,
                    Some(TransportState::Disconnected) => connected = false,
                    Some(TransportState::Failed) => {
                        return Err(SessionError::TransportFailed(
                            "peer connection failed during negotiation".into(),
                        )
                        .into())
                    }
                    Some(TransportState::Closed) | None => {
                        return Err(SessionError::TransportFailed(
                            "peer connection closed during negotiation".into(),
                        )
                        .into())
                    }
                    Some(state) => tracing::debug!(target: "peer", %state, "transport progress"),
                },
                event = channel.next_event() => match event {
                    Some(SignalingEvent::Message(message)) => {
                        let is_answer = matches!(message, SignalingMessage::Answer { .. });
                        apply_message(transport, message).await?;
                        if is_answer {
                            tracing::info!(target: "session", "remote answer applied");
                            answered = true;
                        }
                    }
                    other => channel_event_during_negotiation(other)?,
                },
            }
        }

        self.status.publish(SessionStatus::Ready);

        let grace_period = self.config.disconnect_grace;
        let mut grace: Option<Instant> = None;
        let mut channel_live = true;
        loop {
            let grace_expired = async move {
                match grace {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => return Err(Halt::Cancelled),
                _ = grace_expired => {
                    return Err(SessionError::TransportFailed(format!(
                        "connectivity not restored within {}s",
                        grace_period.as_secs_f64()
                    ))
                    .into())
                }
                state = transport.next_state() => match state {
                    Some(TransportState::Disconnected) => {
                        if grace.is_none() {
                            tracing::warn!(
                                target: "peer",
                                grace_secs = grace_period.as_secs_f64(),
                                "transport disconnected, waiting for recovery"
                            );
                            grace = Some(Instant::now() + grace_period);
                        }
                    }
                    Some(TransportState::Connected) => {
                        if grace.take().is_some() {
                            tracing::info!(target: "peer", "transport recovered");
                        }
                    }
                    Some(TransportState::Failed) => {
                        return Err(SessionError::TransportFailed("peer connection failed".into()).into())
                    }
                    Some(TransportState::Closed) | None => {
                        return Err(SessionError::TransportFailed("peer connection closed".into()).into())
                    }
                    Some(state) => tracing::debug!(target: "peer", %state, "transport state"),
                },
                event = channel.next_event(), if channel_live => match event {
                    Some(SignalingEvent::Message(message)) => apply_message(transport, message).await?,
                    Some(SignalingEvent::ProtocolViolation(reason)) => {
                        tracing::warn!(target: "signaling", %reason, "ignoring malformed message");
                    }
                    Some(SignalingEvent::Open) => {}
                    Some(SignalingEvent::Error(reason)) => {
                        tracing::warn!(target: "signaling", %reason, "signaling lost after ready");
                        channel.close().await;
                        channel_live = false;
                    }
                    Some(SignalingEvent::Closed) | None => {
                        tracing::info!(target: "signaling", "signaling closed after ready");
                        channel.close().await;
                        channel_live = false;
                    }
                },
            }
        }
    }
}

/// Resolves once cancellation is requested or the handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|requested| *requested).await;
}

/// Applies an inbound message once the local offer is out.
async fn apply_message(
    transport: &mut PeerTransportController,
    message: SignalingMessage,
) -> Result<(), SessionError> {
    match message {
        SignalingMessage::Answer { sdp } => transport
            .apply_remote_answer(sdp)
            .await
            .map_err(SessionError::from),
        SignalingMessage::Candidate(candidate) => {
            if let Err(err) = transport.add_remote_candidate(candidate).await {
                tracing::warn!(target: "peer", error = %err, "failed to add remote candidate");
            }
            Ok(())
        }
        SignalingMessage::Offer { .. } => Err(unexpected_offer()),
    }
}

/// Channel events seen before the offer has gone out. An answer here can
/// only be premature.
fn before_offer_sent(
    event: Option<SignalingEvent>,
    early_candidates: &mut Vec<IceCandidate>,
) -> Result<(), SessionError> {
    match event {
        Some(SignalingEvent::Message(SignalingMessage::Answer { .. })) => Err(
            SessionError::NegotiationError("answer received before offer was sent".into()),
        ),
        Some(SignalingEvent::Message(SignalingMessage::Candidate(candidate))) => {
            early_candidates.push(candidate);
            Ok(())
        }
        Some(SignalingEvent::Message(SignalingMessage::Offer { .. })) => Err(unexpected_offer()),
        other => channel_event_during_negotiation(other),
    }
}

/// Non-message channel events before `Ready`. Only a malformed frame is
/// survivable.
fn channel_event_during_negotiation(event: Option<SignalingEvent>) -> Result<(), SessionError> {
    match event {
        Some(SignalingEvent::ProtocolViolation(reason)) => {
            tracing::warn!(target: "signaling", %reason, "ignoring malformed message");
            Ok(())
        }
        Some(SignalingEvent::Error(reason)) => Err(SessionError::ChannelError(reason)),
        Some(SignalingEvent::Closed) | None => Err(SessionError::ChannelError(
            "channel closed during negotiation".into(),
        )),
        Some(SignalingEvent::Open) | Some(SignalingEvent::Message(_)) => Ok(()),
    }
}

fn unexpected_offer() -> SessionError {
    SessionError::NegotiationError("remote sent an offer; this side is the offerer".into())
}
