//! In-memory fakes for the media engine and signaling transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use meetcore::signaling::SignalMessage;
use tokio::sync::mpsc;

use crate::calls::{SignalingChannel, SignalingError};
use crate::room::{
    CameraFacing, EngineError, EngineEvent, EngineEventSender, JoinFailureReason, MediaEngine,
    RenderSurface,
};

/// A call made into [`FakeMediaEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Create(String),
    Destroy,
    JoinRoom {
        room_id: String,
        user_id: String,
        token: String,
    },
    LeaveRoom,
    LocalSurface(RenderSurface),
    RemoteSurface {
        room_id: String,
        user_id: String,
        surface: RenderSurface,
    },
    AudioCapture(bool),
    VideoCapture(bool),
    SwitchCamera(CameraFacing),
}

#[derive(Default)]
struct FakeEngineState {
    calls: Vec<EngineCall>,
    events: Option<EngineEventSender>,
    auto_join: Option<Result<(), JoinFailureReason>>,
    refuse_join_code: Option<i32>,
    fail_create: bool,
}

/// Scriptable media engine. Clones share state, so a test keeps one clone
/// as a controller after handing another to the code under test.
#[derive(Clone, Default)]
pub struct FakeMediaEngine {
    state: Arc<Mutex<FakeEngineState>>,
}

impl FakeMediaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeEngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Complete every subsequent join right away with `outcome`.
    pub fn auto_complete_joins(&self, outcome: Result<(), JoinFailureReason>) {
        self.lock().auto_join = Some(outcome);
    }

    /// Make `join_room` itself return an error with `code`.
    pub fn refuse_joins_with(&self, code: i32) {
        self.lock().refuse_join_code = Some(code);
    }

    pub fn fail_create(&self) {
        self.lock().fail_create = true;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Token passed to the most recent join.
    pub fn last_token(&self) -> Option<String> {
        self.lock().calls.iter().rev().find_map(|c| match c {
            EngineCall::JoinRoom { token, .. } => Some(token.clone()),
            _ => None,
        })
    }

    pub fn is_created(&self) -> bool {
        self.lock().events.is_some()
    }

    /// Push an engine notification. Returns `false` if the engine is not
    /// created or the receiver is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        let sender = self.lock().events.clone();
        sender.is_some_and(|s| s.send(event))
    }

    pub fn complete_join(&self, room_id: &str, result: Result<(), JoinFailureReason>) -> bool {
        self.emit(EngineEvent::JoinResult {
            room_id: room_id.to_string(),
            result,
        })
    }

    pub fn remote_join(&self, room_id: &str, user_id: &str) -> bool {
        self.emit(EngineEvent::RemoteJoined {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        })
    }

    pub fn remote_leave(&self, room_id: &str, user_id: &str) -> bool {
        self.emit(EngineEvent::RemoteLeft {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

impl MediaEngine for FakeMediaEngine {
    fn create(&mut self, app_id: &str, events: EngineEventSender) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.fail_create {
            return Err(EngineError::new(-1, "create failed"));
        }
        state.calls.push(EngineCall::Create(app_id.to_string()));
        state.events = Some(events);
        Ok(())
    }

    fn destroy(&mut self) {
        let mut state = self.lock();
        state.calls.push(EngineCall::Destroy);
        state.events = None;
    }

    fn join_room(&mut self, room_id: &str, user_id: &str, token: &str) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::JoinRoom {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            token: token.to_string(),
        });
        if let Some(code) = state.refuse_join_code {
            return Err(EngineError::new(code, "join refused"));
        }
        if let (Some(result), Some(events)) = (state.auto_join, &state.events) {
            events.send(EngineEvent::JoinResult {
                room_id: room_id.to_string(),
                result,
            });
        }
        Ok(())
    }

    fn leave_room(&mut self) {
        self.lock().calls.push(EngineCall::LeaveRoom);
    }

    fn set_local_surface(&mut self, surface: RenderSurface) {
        self.lock().calls.push(EngineCall::LocalSurface(surface));
    }

    fn set_remote_surface(&mut self, room_id: &str, user_id: &str, surface: RenderSurface) {
        self.lock().calls.push(EngineCall::RemoteSurface {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            surface,
        });
    }

    fn set_audio_capture(&mut self, enabled: bool) {
        self.lock().calls.push(EngineCall::AudioCapture(enabled));
    }

    fn set_video_capture(&mut self, enabled: bool) {
        self.lock().calls.push(EngineCall::VideoCapture(enabled));
    }

    fn switch_camera(&mut self, facing: CameraFacing) {
        self.lock().calls.push(EngineCall::SwitchCamera(facing));
    }
}

/// Signaling transport that hands every sent message to a test receiver.
#[derive(Debug)]
pub struct RecordingSignaling {
    tx: mpsc::UnboundedSender<SignalMessage>,
    failing: AtomicBool,
}

impl RecordingSignaling {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SignalMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                failing: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// While failing, sends return an error and nothing is recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SignalingChannel for RecordingSignaling {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SignalingError::Delivery("simulated failure".to_string()));
        }
        self.tx
            .send(message)
            .map_err(|_| SignalingError::Disconnected)
    }
}
