use crate::error::SessionError;
use std::fmt;
use tokio::sync::{mpsc, watch};

/// Externally observable lifecycle of one session attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    AcquiringMedia,
    ChannelConnecting,
    Negotiating,
    Ready,
    Failed(SessionError),
    Closed,
}

impl SessionStatus {
    /// `Failed` and `Closed` are final; nothing is published after them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Failed(_) | SessionStatus::Closed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::AcquiringMedia => "acquiring_media",
            SessionStatus::ChannelConnecting => "channel_connecting",
            SessionStatus::Negotiating => "negotiating",
            SessionStatus::Ready => "ready",
            SessionStatus::Failed(_) => "failed",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Single writer of the session status.
///
/// Keeps the latest value in a `watch` and every transition, in order, in
/// an unbounded history queue.
pub(crate) struct StatusPublisher {
    current: watch::Sender<SessionStatus>,
    history: mpsc::UnboundedSender<SessionStatus>,
}

impl StatusPublisher {
    pub(crate) fn new() -> (
        Self,
        watch::Receiver<SessionStatus>,
        mpsc::UnboundedReceiver<SessionStatus>,
    ) {
        let (current, current_rx) = watch::channel(SessionStatus::Idle);
        let (history, history_rx) = mpsc::unbounded_channel();
        let _ = history.send(SessionStatus::Idle);
        (Self { current, history }, current_rx, history_rx)
    }

    pub(crate) fn current(&self) -> SessionStatus {
        self.current.borrow().clone()
    }

    /// Publishes `next` unless the status is already terminal or unchanged.
    pub(crate) fn publish(&self, next: SessionStatus) -> bool {
        let previous = self.current();
        if previous.is_terminal() {
            tracing::debug!(target: "session", %previous, ignored = %next, "status already terminal");
            return false;
        }
        if previous == next {
            return false;
        }

        match &next {
            SessionStatus::Failed(reason) => {
                tracing::warn!(target: "session", from = %previous, %reason, "session failed")
            }
            _ => tracing::info!(target: "session", from = %previous, to = %next, "status changed"),
        }
        self.current.send_replace(next.clone());
        let _ = self.history.send(next);
        true
    }
}
