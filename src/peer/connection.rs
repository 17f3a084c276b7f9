use crate::error::TransportError;
use crate::logger::{dump_candidate, dump_selected_pair};
use crate::media::CaptureTrack;
use crate::peer::ice::{analyze_candidates, to_rtc_candidate, to_rtc_ice_servers};
use crate::peer::state::{TransportState, GATHER_TIMEOUT};
use crate::peer::types::{IceCandidate, ServerConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::{
    configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
    sdp::session_description::RTCSessionDescription, RTCPeerConnection,
};

/// Creates peer connections for the transport controller.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Builds a new connection in state `New`. Every connectivity change
    /// must be pushed into `states`.
    async fn connect(
        &self,
        ice_servers: &[ServerConfig],
        states: mpsc::UnboundedSender<TransportState>,
    ) -> Result<Box<dyn PeerLink>, TransportError>;
}

/// Low-level operations on one peer connection.
///
/// Ordering rules (offer before answer, answer exactly once) are enforced by
/// `PeerTransportController`, not here.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn add_track(&self, track: &CaptureTrack) -> Result<(), TransportError>;

    /// Creates an offer, installs it as the local description and returns
    /// the local SDP as installed.
    async fn create_offer(&self) -> Result<String, TransportError>;

    async fn set_remote_answer(&self, sdp: &str) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// webrtc-rs backed connector
#[derive(Debug, Clone)]
pub struct WebRtcConnector {
    gather_timeout: Duration,
}

impl WebRtcConnector {
    pub fn new(gather_timeout: Duration) -> Self {
        Self { gather_timeout }
    }
}

impl Default for WebRtcConnector {
    fn default() -> Self {
        Self::new(GATHER_TIMEOUT)
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        ice_servers: &[ServerConfig],
        states: mpsc::UnboundedSender<TransportState>,
    ) -> Result<Box<dyn PeerLink>, TransportError> {
        let pc = new_peer(ice_servers, states).await?;
        Ok(Box::new(WebRtcPeer {
            pc,
            gather_timeout: self.gather_timeout,
        }))
    }
}

/// Creates the peer connection with media codecs registered and handlers
/// wired to `states`.
async fn new_peer(
    ice_servers: &[ServerConfig],
    states: mpsc::UnboundedSender<TransportState>,
) -> Result<Arc<RTCPeerConnection>, TransportError> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| TransportError::Backend(format!("failed to register codecs: {e}")))?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| TransportError::Backend(format!("failed to register interceptors: {e}")))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = Arc::new(
        api.new_peer_connection(rtc_config(ice_servers))
            .await
            .map_err(|e| TransportError::Backend(format!("failed to create peer connection: {e}")))?,
    );

    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        Box::pin(async move {
            match cand {
                Some(c) => dump_candidate("LOCAL", &c),
                None => tracing::debug!(target: "peer", "ICE candidate gathering completed"),
            }
        })
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        tracing::debug!(target: "peer", ?state, "ICE gathering state changed");
        Box::pin(async {})
    }));

    let pc_stats = Arc::downgrade(&pc);
    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        tracing::debug!(target: "peer", state = ?st, "peer connection state changed");

        if st == RTCPeerConnectionState::Failed {
            if let Some(pc) = pc_stats.upgrade() {
                tokio::spawn(async move {
                    dump_selected_pair(&pc, "BEFORE-FAIL").await;
                });
            }
        }
        if let Some(state) = TransportState::from_rtc(st) {
            let _ = states.send(state);
        }
        Box::pin(async {})
    }));

    Ok(pc)
}

fn rtc_config(ice_servers: &[ServerConfig]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: to_rtc_ice_servers(ice_servers),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    gather_timeout: Duration,
}

#[async_trait]
impl PeerLink for WebRtcPeer {
    async fn add_track(&self, track: &CaptureTrack) -> Result<(), TransportError> {
        let sender = self
            .pc
            .add_track(track.track_local())
            .await
            .map_err(|e| TransportError::Backend(format!("failed to add {} track: {e}", track.kind())))?;

        // RTCP has to be drained for the interceptors (NACK, reports) to run
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::Negotiation(format!("create offer: {e}")))?;

        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| TransportError::Negotiation(format!("set local description: {e}")))?;

        // no trickle on the wire: the offer has to carry the candidates
        if timeout(self.gather_timeout, gathered.recv()).await.is_err() {
            tracing::warn!(
                target: "peer",
                timeout_secs = self.gather_timeout.as_secs(),
                "ICE gathering timed out; sending partial offer"
            );
        }

        let local = self
            .pc
            .local_description()
            .await
            .ok_or(TransportError::InvalidState("local description missing after offer"))?;
        analyze_candidates(&local.sdp);
        Ok(local.sdp)
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<(), TransportError> {
        let answer = RTCSessionDescription::answer(sdp.to_owned())
            .map_err(|e| TransportError::Negotiation(format!("invalid answer: {e}")))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| TransportError::Negotiation(format!("set remote description: {e}")))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError> {
        self.pc
            .add_ice_candidate(to_rtc_candidate(candidate))
            .await
            .map_err(|e| TransportError::Negotiation(format!("add ICE candidate: {e}")))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::Backend(format!("close peer connection: {e}")))
    }
}
