use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote ICE candidate as it travels over the signaling channel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

/// ICE server configuration (STUN reflection or TURN relay)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: url.clone(),
            r#type: "stun".into(),
            url,
            username: None,
            credential: None,
        }
    }

    pub fn is_turn(&self) -> bool {
        self.r#type == "turn" || self.url.starts_with("turn:") || self.url.starts_with("turns:")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorRole {
    Local,
    Remote,
}

/// A session description owned by the transport.
///
/// Descriptors are only ever constructed once they have been set on the
/// peer connection, so holding one means the transport already uses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationDescriptor {
    pub role: DescriptorRole,
    pub sdp: String,
    pub applied_at: DateTime<Utc>,
}

impl NegotiationDescriptor {
    pub(crate) fn applied(role: DescriptorRole, sdp: String) -> Self {
        Self {
            role,
            sdp,
            applied_at: Utc::now(),
        }
    }
}
