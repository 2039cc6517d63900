//! Contract with the external media engine.
//!
//! The engine (an RTC SDK in production, `FakeMediaEngine` from the
//! `test-utils` feature in tests) performs the actual capture, transport and rendering. It is
//! owned through a [`MediaEngineHandle`] and reports back through an
//! [`EngineEventSender`], which may be called from any engine thread.

use log::debug;
use thiserror::Error;
use tokio::sync::mpsc;

/// Opaque rendering target supplied by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderSurface(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraFacing {
    #[default]
    Front,
    Back,
}

impl CameraFacing {
    pub fn toggled(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// Why a room join did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinFailureReason {
    TokenRejected,
    NetworkUnavailable,
    RoomFull,
    /// Engine-specific code with no dedicated reason.
    Engine(i32),
}

impl JoinFailureReason {
    /// Map an RTC SDK error code onto a join failure.
    pub fn from_engine_code(code: i32) -> Self {
        match code {
            -4 => Self::NetworkUnavailable,
            -5 | -6 | -10 => Self::TokenRejected,
            other => Self::Engine(other),
        }
    }

    /// Codes that mean the join attempt itself is dead.
    pub fn is_join_fatal_code(code: i32) -> bool {
        !matches!(Self::from_engine_code(code), Self::Engine(_))
    }
}

impl std::fmt::Display for JoinFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenRejected => f.write_str("token rejected"),
            Self::NetworkUnavailable => f.write_str("network unavailable"),
            Self::RoomFull => f.write_str("room full"),
            Self::Engine(code) => write!(f, "engine error {code}"),
        }
    }
}

/// Notifications raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Completion of a `join_room` request.
    JoinResult {
        room_id: String,
        result: Result<(), JoinFailureReason>,
    },
    /// A remote user started publishing in the room.
    RemoteJoined { room_id: String, user_id: String },
    /// A remote user left or stopped publishing.
    RemoteLeft { room_id: String, user_id: String },
    /// Engine-level error not tied to a specific request.
    Error { code: i32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("media engine error {code}: {message}")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Thread-safe sink the engine pushes notifications into. Notifications
/// queue in FIFO order until the coordination task drains them.
#[derive(Debug, Clone)]
pub struct EngineEventSender(mpsc::UnboundedSender<EngineEvent>);

impl EngineEventSender {
    /// Returns `false` once the coordination task is gone.
    pub fn send(&self, event: EngineEvent) -> bool {
        match self.0.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(target: "Room/Engine", "Dropping engine event, receiver gone: {:?}", e.0);
                false
            }
        }
    }
}

pub fn engine_event_channel() -> (EngineEventSender, mpsc::UnboundedReceiver<EngineEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EngineEventSender(tx), rx)
}

/// Calls the room manager makes into the media engine.
///
/// Every method must return promptly; long-running work completes in the
/// background and is reported through the event sender given to `create`.
pub trait MediaEngine: Send {
    fn create(&mut self, app_id: &str, events: EngineEventSender) -> Result<(), EngineError>;
    fn destroy(&mut self);
    fn join_room(&mut self, room_id: &str, user_id: &str, token: &str) -> Result<(), EngineError>;
    fn leave_room(&mut self);
    fn set_local_surface(&mut self, surface: RenderSurface);
    fn set_remote_surface(&mut self, room_id: &str, user_id: &str, surface: RenderSurface);
    fn set_audio_capture(&mut self, enabled: bool);
    fn set_video_capture(&mut self, enabled: bool);
    fn switch_camera(&mut self, facing: CameraFacing);
}

/// Owned handle to the process' single media engine.
///
/// `init` creates the engine for one app id; `shutdown` destroys it. The
/// handle is passed into [`super::RoomSessionManager`] rather than reached
/// through a global.
pub struct MediaEngineHandle {
    engine: Box<dyn MediaEngine>,
    app_id: Option<String>,
}

impl MediaEngineHandle {
    pub fn new(engine: impl MediaEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
            app_id: None,
        }
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.app_id.is_some()
    }

    pub fn init(&mut self, app_id: &str, events: EngineEventSender) -> Result<(), EngineError> {
        self.engine.create(app_id, events)?;
        self.app_id = Some(app_id.to_string());
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if self.app_id.take().is_some() {
            self.engine.destroy();
        }
    }

    pub(crate) fn engine(&mut self) -> &mut dyn MediaEngine {
        self.engine.as_mut()
    }
}

impl std::fmt::Debug for MediaEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaEngineHandle")
            .field("app_id", &self.app_id)
            .finish()
    }
}
