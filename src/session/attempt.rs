use crate::media::{DeviceCapture, MediaHandle};
use crate::peer::PeerTransportController;
use crate::signaling::SignalingChannel;

/// Resources owned by one session attempt.
///
/// Each slot is filled as the attempt progresses and emptied by `teardown`.
#[derive(Default)]
pub(crate) struct Attempt {
    pub(crate) media: Option<MediaHandle>,
    pub(crate) channel: Option<SignalingChannel>,
    pub(crate) transport: Option<PeerTransportController>,
}

impl Attempt {
    /// Releases everything still held, newest first: transport, channel,
    /// then capture. Safe to call more than once.
    pub(crate) async fn teardown(&mut self, capture: &dyn DeviceCapture) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        if let Some(mut media) = self.media.take() {
            capture.release(&mut media);
            tracing::debug!(target: "media", "capture released");
        }
    }
}
