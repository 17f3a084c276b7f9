use crate::error::TransportError;
use crate::media::MediaHandle;
use crate::peer::connection::{PeerConnector, PeerLink};
use crate::peer::state::TransportState;
use crate::peer::types::{DescriptorRole, IceCandidate, NegotiationDescriptor, ServerConfig};
use tokio::sync::mpsc;

/// Owns one peer transport for one session attempt.
///
/// Enforces the negotiation order: media is attached before the offer, the
/// offer is created and set locally in one step, and exactly one remote
/// answer is accepted after it.
pub struct PeerTransportController {
    link: Box<dyn PeerLink>,
    states: mpsc::UnboundedReceiver<TransportState>,
    state: TransportState,
    attached_tracks: usize,
    local: Option<NegotiationDescriptor>,
    remote: Option<NegotiationDescriptor>,
    pending_candidates: Vec<IceCandidate>,
    finished: bool,
    closed: bool,
}

impl PeerTransportController {
    pub async fn create(
        connector: &dyn PeerConnector,
        ice_servers: &[ServerConfig],
    ) -> Result<Self, TransportError> {
        let (state_tx, states) = mpsc::unbounded_channel();
        let link = connector.connect(ice_servers, state_tx).await?;
        tracing::debug!(target: "peer", ice_servers = ice_servers.len(), "peer transport created");
        Ok(Self {
            link,
            states,
            state: TransportState::New,
            attached_tracks: 0,
            local: None,
            remote: None,
            pending_candidates: Vec::new(),
            finished: false,
            closed: false,
        })
    }

    /// Binds every track of `media` to the transport.
    pub async fn attach(&mut self, media: &MediaHandle) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.local.is_some() {
            return Err(TransportError::InvalidState("media must be attached before the offer"));
        }
        for track in media.tracks() {
            self.link.add_track(track).await?;
            self.attached_tracks += 1;
            tracing::debug!(target: "peer", kind = %track.kind(), id = track.id(), "track attached");
        }
        Ok(())
    }

    /// Creates the local offer and installs it as the local description.
    pub async fn create_offer(&mut self) -> Result<NegotiationDescriptor, TransportError> {
        self.ensure_open()?;
        if self.attached_tracks == 0 {
            return Err(TransportError::InvalidState("no media attached"));
        }
        if self.local.is_some() {
            return Err(TransportError::InvalidState("offer already created"));
        }
        let sdp = self.link.create_offer().await?;
        let descriptor = NegotiationDescriptor::applied(DescriptorRole::Local, sdp);
        self.local = Some(descriptor.clone());
        Ok(descriptor)
    }

    /// Applies the remote answer. Rejected without a local offer and on
    /// every call after the first successful one.
    pub async fn apply_remote_answer(&mut self, sdp: String) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.local.is_none() {
            return Err(TransportError::InvalidState("no local offer has been set"));
        }
        if self.remote.is_some() {
            return Err(TransportError::InvalidState("remote answer already applied"));
        }
        self.link.set_remote_answer(&sdp).await?;
        self.remote = Some(NegotiationDescriptor::applied(DescriptorRole::Remote, sdp));

        for candidate in std::mem::take(&mut self.pending_candidates) {
            tracing::debug!(target: "peer", ?candidate, "applying queued remote candidate");
            if let Err(err) = self.link.add_ice_candidate(&candidate).await {
                tracing::warn!(target: "peer", error = %err, "failed to apply queued candidate");
            }
        }
        Ok(())
    }

    /// Applies a trickled remote candidate, queueing it until the answer is set.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.remote.is_none() {
            tracing::debug!(target: "peer", "remote description not set yet, queuing candidate");
            self.pending_candidates.push(candidate);
            return Ok(());
        }
        self.link.add_ice_candidate(&candidate).await
    }

    /// Next connectivity change. Yields `None` once `Failed` or `Closed`
    /// has been delivered, or after `close`.
    pub async fn next_state(&mut self) -> Option<TransportState> {
        if self.finished || self.closed {
            return None;
        }
        let state = self.states.recv().await?;
        self.state = state;
        if state.is_terminal() {
            self.finished = true;
        }
        Some(state)
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn local_description(&self) -> Option<&NegotiationDescriptor> {
        self.local.as_ref()
    }

    pub fn remote_description(&self) -> Option<&NegotiationDescriptor> {
        self.remote.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the connection and its track bindings. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending_candidates.clear();
        if let Err(err) = self.link.close().await {
            tracing::warn!(target: "peer", error = %err, "peer transport close failed");
        }
        self.state = TransportState::Closed;
        self.states.close();
        tracing::debug!(target: "peer", "peer transport closed");
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::InvalidState("transport is closed"))
        } else {
            Ok(())
        }
    }
}
