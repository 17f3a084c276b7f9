use crate::error::SignalingError;
use crate::peer::types::IceCandidate;
use serde::{Deserialize, Serialize};

/// Negotiation message exchanged with the interview endpoint, one JSON
/// object per frame: `{"type":"offer","sdp":"…"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate(IceCandidate),
}

impl SignalingMessage {
    pub fn offer(sdp: impl Into<String>) -> Self {
        SignalingMessage::Offer { sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        SignalingMessage::Answer { sdp: sdp.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Offer { .. } => "offer",
            SignalingMessage::Answer { .. } => "answer",
            SignalingMessage::Candidate(_) => "candidate",
        }
    }

    pub fn encode(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self).map_err(|err| SignalingError::Protocol(err.to_string()))
    }

    /// Unparseable payloads and unknown `type` values are protocol errors.
    pub fn decode(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(|err| SignalingError::Protocol(err.to_string()))
    }
}
