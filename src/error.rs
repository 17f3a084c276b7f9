use thiserror::Error;

/// Failure taxonomy surfaced through `SessionStatus::Failed`.
///
/// Everything except `ProtocolViolation` is terminal for the attempt that
/// produced it. `ProtocolViolation` is listed for completeness; the
/// controller recovers from it locally and never reports it as a status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("camera or microphone permission denied")]
    PermissionDenied,
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("signaling channel error: {0}")]
    ChannelError(String),
    #[error("signaling protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("negotiation failed: {0}")]
    NegotiationError(String),
    #[error("peer transport failed: {0}")]
    TransportFailed(String),
    #[error("no authenticated identity supplied")]
    Unauthorized,
    #[error("session cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("signaling channel is not open")]
    NotOpen,
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    Socket(String),
    #[error("malformed signaling message: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid transport state: {0}")]
    InvalidState(&'static str),
    #[error("negotiation error: {0}")]
    Negotiation(String),
    #[error("peer connection error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid signaling url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported signaling scheme `{0}` (expected ws, wss, http or https)")]
    UnsupportedScheme(String),
    #[error("session id cannot be empty")]
    EmptySessionId,
    #[error("at least one ICE server is required")]
    NoIceServers,
    #[error("ICE server `{0}` has an empty url")]
    EmptyIceUrl(String),
    #[error("TURN server `{0}` requires username and credential")]
    MissingTurnCredentials(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => SessionError::PermissionDenied,
            CaptureError::DeviceUnavailable(reason) => SessionError::DeviceUnavailable(reason),
        }
    }
}

impl From<SignalingError> for SessionError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::Protocol(reason) => SessionError::ProtocolViolation(reason),
            other => SessionError::ChannelError(other.to_string()),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Backend(reason) => SessionError::TransportFailed(reason),
            other => SessionError::NegotiationError(other.to_string()),
        }
    }
}
