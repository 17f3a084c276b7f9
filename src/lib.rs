pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
mod utils;

pub use config::SessionConfig;
pub use error::{CaptureError, ConfigError, SessionError, SignalingError, TransportError};
pub use logger::{LogConfig, LogLevel};
pub use media::{DeviceCapture, MediaHandle, SyntheticCapture};
pub use peer::{PeerConnector, PeerLink, PeerTransportController, TransportState, WebRtcConnector};
pub use session::{Identity, SessionController, SessionHandle, SessionId, SessionStatus};
pub use signaling::{SignalingChannel, SignalingEvent, SignalingMessage};
