pub mod connection;
pub mod controller;
pub mod ice;
pub mod state;
pub mod types;

pub use connection::{PeerConnector, PeerLink, WebRtcConnector};
pub use controller::PeerTransportController;
pub use state::{TransportState, GATHER_TIMEOUT, GRACE_PERIOD};
pub use types::{DescriptorRole, IceCandidate, NegotiationDescriptor, ServerConfig};
