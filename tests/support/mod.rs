#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use interview_rtc_lib::media::{CaptureTrack, DeviceCapture, MediaHandle, ReleaseTracker};
use interview_rtc_lib::peer::{IceCandidate, PeerConnector, PeerLink, ServerConfig, TransportState};
use interview_rtc_lib::{CaptureError, SessionHandle, SessionStatus, TransportError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub const STEP: Duration = Duration::from_secs(5);

pub fn answer_json(sdp: &str) -> String {
    format!(r#"{{"type":"answer","sdp":"{sdp}"}}"#)
}

/// How the stub interview endpoint behaves towards its single client.
#[derive(Clone, Default)]
pub struct StubScript {
    /// Frames pushed right after the handshake.
    pub on_connect: Vec<String>,
    /// Answer every offer with this SDP.
    pub answer: Option<String>,
    /// Frames pushed after each answer.
    pub after_answer: Vec<String>,
    /// Close the socket once the answer is out.
    pub close_after_answer: bool,
    /// Accept TCP but never complete the WebSocket handshake.
    pub stall_handshake: bool,
}

impl StubScript {
    pub fn answering() -> Self {
        Self {
            answer: Some("v=0 stub-answer".into()),
            ..Default::default()
        }
    }
}

/// Loopback stand-in for the interview signaling endpoint.
pub struct StubServer {
    base: String,
    path: Arc<Mutex<Option<String>>>,
    received: Arc<Mutex<Vec<String>>>,
    disconnected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(script: StubScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        let path = Arc::new(Mutex::new(None));
        let received = Arc::new(Mutex::new(Vec::new()));
        let disconnected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(serve(
            listener,
            script,
            Arc::clone(&path),
            Arc::clone(&received),
            Arc::clone(&disconnected),
        ));

        Self {
            base,
            path,
            received,
            disconnected,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        self.base.clone()
    }

    /// Request path of the accepted connection, if any.
    pub fn path(&self) -> Option<String> {
        self.path.lock().unwrap().clone()
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn offers(&self) -> usize {
        self.received()
            .iter()
            .filter(|text| text.contains(r#""type":"offer""#))
            .count()
    }

    pub fn client_gone(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub async fn wait_client_gone(&self) {
        timeout(STEP, async {
            while !self.client_gone() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("client did not disconnect");
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    listener: TcpListener,
    script: StubScript,
    path: Arc<Mutex<Option<String>>>,
    received: Arc<Mutex<Vec<String>>>,
    disconnected: Arc<AtomicBool>,
) {
    let Ok((mut stream, _)) = listener.accept().await else {
        return;
    };

    if script.stall_handshake {
        let mut buf = [0u8; 1024];
        while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
        disconnected.store(true, Ordering::SeqCst);
        return;
    }

    let record_path = Arc::clone(&path);
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *record_path.lock().unwrap() = Some(req.uri().path().to_string());
        Ok(resp)
    };
    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        disconnected.store(true, Ordering::SeqCst);
        return;
    };
    let (mut tx, mut rx) = ws.split();

    for frame in &script.on_connect {
        let _ = tx.send(Message::Text(frame.clone())).await;
    }

    while let Some(frame) = rx.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };
        received.lock().unwrap().push(text.clone());

        if text.contains(r#""type":"offer""#) {
            if let Some(sdp) = &script.answer {
                let _ = tx.send(Message::Text(answer_json(sdp))).await;
                for frame in &script.after_answer {
                    let _ = tx.send(Message::Text(frame.clone())).await;
                }
                if script.close_after_answer {
                    let _ = tx.close().await;
                    break;
                }
            }
        }
    }
    disconnected.store(true, Ordering::SeqCst);
}

/// Scripted behaviour of the fake peer connection.
#[derive(Clone, Default)]
pub struct PeerScript {
    /// Time spent building the peer connection.
    pub connect_delay: Option<Duration>,
    pub offer_delay: Option<Duration>,
    /// Report `Connecting` then `Connected` once the answer is applied.
    pub connect_on_answer: bool,
    /// Report `Failed` once the answer is applied.
    pub fail_on_answer: bool,
    pub fail_connect: bool,
}

impl PeerScript {
    pub fn connecting() -> Self {
        Self {
            connect_on_answer: true,
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct PeerRecord {
    pub connects: AtomicUsize,
    pub offers: AtomicUsize,
    pub answers: Mutex<Vec<String>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub closed: AtomicBool,
    states: Mutex<Option<mpsc::UnboundedSender<TransportState>>>,
}

impl PeerRecord {
    pub fn push_state(&self, state: TransportState) {
        if let Some(states) = self.states.lock().unwrap().as_ref() {
            let _ = states.send(state);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeConnector {
    script: PeerScript,
    pub record: Arc<PeerRecord>,
}

impl FakeConnector {
    pub fn new(script: PeerScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            record: Arc::default(),
        })
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        _ice_servers: &[ServerConfig],
        states: mpsc::UnboundedSender<TransportState>,
    ) -> Result<Box<dyn PeerLink>, TransportError> {
        self.record.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.script.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.fail_connect {
            return Err(TransportError::Backend("no network".into()));
        }
        *self.record.states.lock().unwrap() = Some(states);
        Ok(Box::new(FakePeer {
            script: self.script.clone(),
            record: Arc::clone(&self.record),
        }))
    }
}

struct FakePeer {
    script: PeerScript,
    record: Arc<PeerRecord>,
}

#[async_trait]
impl PeerLink for FakePeer {
    async fn add_track(&self, _track: &CaptureTrack) -> Result<(), TransportError> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, TransportError> {
        if let Some(delay) = self.script.offer_delay {
            tokio::time::sleep(delay).await;
        }
        self.record.offers.fetch_add(1, Ordering::SeqCst);
        Ok("v=0 fake-offer".into())
    }

    async fn set_remote_answer(&self, sdp: &str) -> Result<(), TransportError> {
        self.record.answers.lock().unwrap().push(sdp.to_owned());
        if self.script.connect_on_answer {
            self.record.push_state(TransportState::Connecting);
            self.record.push_state(TransportState::Connected);
        }
        if self.script.fail_on_answer {
            self.record.push_state(TransportState::Failed);
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), TransportError> {
        self.record.candidates.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Copy)]
pub enum CaptureOutcome {
    Grant,
    Deny,
    AudioOnly,
    /// Never resolves, like an unanswered permission prompt.
    Hang,
}

pub struct FakeCapture {
    outcome: CaptureOutcome,
    pub acquisitions: AtomicUsize,
    trackers: Mutex<Vec<ReleaseTracker>>,
}

impl FakeCapture {
    pub fn new(outcome: CaptureOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            acquisitions: AtomicUsize::new(0),
            trackers: Mutex::new(Vec::new()),
        })
    }

    /// True when every granted handle has been released.
    pub fn all_released(&self) -> bool {
        self.trackers.lock().unwrap().iter().all(ReleaseTracker::is_released)
    }

    pub fn granted(&self) -> usize {
        self.trackers.lock().unwrap().len()
    }
}

#[async_trait]
impl DeviceCapture for FakeCapture {
    async fn acquire(&self) -> Result<MediaHandle, CaptureError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            CaptureOutcome::Grant => {
                let handle = MediaHandle::from_tracks(vec![
                    CaptureTrack::opus("fake"),
                    CaptureTrack::vp8("fake"),
                ])?;
                self.trackers.lock().unwrap().push(handle.release_tracker());
                Ok(handle)
            }
            CaptureOutcome::Deny => Err(CaptureError::PermissionDenied),
            CaptureOutcome::AudioOnly => MediaHandle::from_tracks(vec![CaptureTrack::opus("fake")]),
            CaptureOutcome::Hang => std::future::pending().await,
        }
    }
}

/// Collects statuses up to and including the first one matching `until`.
pub async fn statuses_until(
    handle: &mut SessionHandle,
    until: impl Fn(&SessionStatus) -> bool,
) -> Vec<SessionStatus> {
    let mut seen = Vec::new();
    loop {
        let status = timeout(STEP, handle.next_status())
            .await
            .unwrap_or_else(|_| panic!("status stalled after {seen:?}"))
            .unwrap_or_else(|| panic!("status stream ended after {seen:?}"));
        let done = until(&status);
        seen.push(status);
        if done {
            return seen;
        }
    }
}

pub async fn statuses_until_terminal(handle: &mut SessionHandle) -> Vec<SessionStatus> {
    statuses_until(handle, SessionStatus::is_terminal).await
}
