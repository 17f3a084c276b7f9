use std::fmt;
use std::time::Duration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Default wait before a disconnected transport is declared failed
pub const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Default bound on local ICE gathering before the offer is sent
pub const GATHER_TIMEOUT: Duration = Duration::from_secs(10);

/// Connectivity of the peer transport as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// `Failed` and `Closed` end the state sequence.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransportState::Failed | TransportState::Closed)
    }

    pub(crate) fn from_rtc(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::New => Some(TransportState::New),
            RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
            RTCPeerConnectionState::Connected => Some(TransportState::Connected),
            RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
            RTCPeerConnectionState::Failed => Some(TransportState::Failed),
            RTCPeerConnectionState::Closed => Some(TransportState::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_peer_connection_states() {
        assert_eq!(
            TransportState::from_rtc(RTCPeerConnectionState::Connected),
            Some(TransportState::Connected)
        );
        assert_eq!(
            TransportState::from_rtc(RTCPeerConnectionState::Unspecified),
            None
        );
        assert!(TransportState::Failed.is_terminal());
        assert!(!TransportState::Disconnected.is_terminal());
    }
}
