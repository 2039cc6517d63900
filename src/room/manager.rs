//! Room session manager: one media-engine connection per call attempt.

use std::collections::HashSet;

use log::{debug, info, warn};
use meetcore::CallId;

use super::engine::{
    CameraFacing, EngineEvent, EngineEventSender, JoinFailureReason, MediaEngineHandle,
    RenderSurface,
};
use super::error::RoomError;

/// Lifecycle of the engine connection.
///
/// `Leaving` only exists for the duration of [`RoomSessionManager::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomState {
    #[default]
    Uninitialized,
    Initialized,
    Joining,
    Joined,
    Leaving,
}

/// The room this device is in (or joining) for one call.
#[derive(Debug, Clone)]
pub struct RoomConnection {
    /// Every event raised from this connection carries this tag.
    pub call_id: CallId,
    pub room_id: String,
    pub local_user_id: String,
    pub joined: bool,
    pub remote_participants: HashSet<String>,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub camera: CameraFacing,
}

impl RoomConnection {
    fn new(call_id: CallId, room_id: &str, local_user_id: &str) -> Self {
        Self {
            call_id,
            room_id: room_id.to_string(),
            local_user_id: local_user_id.to_string(),
            joined: false,
            remote_participants: HashSet::new(),
            audio_muted: false,
            video_muted: false,
            camera: CameraFacing::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEventKind {
    LocalJoinSuccess,
    LocalJoinFailure(JoinFailureReason),
    RemoteJoined(String),
    RemoteLeft(String),
    EngineError(i32),
}

/// A room notification, tagged with the call it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEvent {
    pub call_id: CallId,
    pub kind: RoomEventKind,
}

pub struct RoomSessionManager {
    engine: MediaEngineHandle,
    events: EngineEventSender,
    state: RoomState,
    connection: Option<RoomConnection>,
}

impl RoomSessionManager {
    pub fn new(engine: MediaEngineHandle, events: EngineEventSender) -> Self {
        Self {
            engine,
            events,
            state: RoomState::Uninitialized,
            connection: None,
        }
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn connection(&self) -> Option<&RoomConnection> {
        self.connection.as_ref()
    }

    pub fn is_joined(&self) -> bool {
        self.state == RoomState::Joined
    }

    pub fn remote_participants(&self) -> impl Iterator<Item = &str> {
        self.connection
            .iter()
            .flat_map(|c| c.remote_participants.iter().map(String::as_str))
    }

    /// Create the engine for `app_id`. Repeating the same id is a no-op.
    pub fn init(&mut self, app_id: &str) -> Result<(), RoomError> {
        if app_id.trim().is_empty() {
            return Err(RoomError::InvalidAppId);
        }
        if let Some(current) = self.engine.app_id() {
            if current == app_id {
                return Ok(());
            }
            return Err(RoomError::EngineBusy {
                current: current.to_string(),
            });
        }

        self.engine.init(app_id, self.events.clone())?;
        self.state = RoomState::Initialized;
        info!(target: "Room/Session", "Media engine initialized for app {app_id}");
        Ok(())
    }

    /// Start joining `room_id`. Completion arrives later as exactly one
    /// `LocalJoinSuccess` or `LocalJoinFailure`.
    pub fn join(
        &mut self,
        call_id: CallId,
        room_id: &str,
        user_id: &str,
        token: &str,
    ) -> Result<(), RoomError> {
        match self.state {
            RoomState::Uninitialized | RoomState::Leaving => return Err(RoomError::NotInitialized),
            RoomState::Joining => return Err(RoomError::JoinInProgress(self.current_room())),
            RoomState::Joined => return Err(RoomError::AlreadyInRoom(self.current_room())),
            RoomState::Initialized => {}
        }

        self.connection = Some(RoomConnection::new(call_id, room_id, user_id));
        self.state = RoomState::Joining;

        let engine = self.engine.engine();
        match engine.join_room(room_id, user_id, token) {
            Ok(()) => {
                engine.set_video_capture(true);
                engine.set_audio_capture(true);
                debug!(target: "Room/Session", "Joining room {room_id} as {user_id}");
            }
            Err(e) => {
                // Report a refused request the same way as an asynchronous failure.
                warn!(target: "Room/Session", "Engine refused join of {room_id}: {e}");
                self.events.send(EngineEvent::JoinResult {
                    room_id: room_id.to_string(),
                    result: Err(JoinFailureReason::from_engine_code(e.code)),
                });
            }
        }
        Ok(())
    }

    /// Leave the room (cancelling a pending join) and shut the engine down.
    /// Safe to call in any state.
    pub fn leave(&mut self) {
        if self.state == RoomState::Uninitialized {
            debug!(target: "Room/Session", "Leave requested while uninitialized, ignoring");
            return;
        }

        self.state = RoomState::Leaving;
        if let Some(connection) = self.connection.take() {
            let engine = self.engine.engine();
            engine.leave_room();
            engine.set_video_capture(false);
            engine.set_audio_capture(false);
            info!(
                target: "Room/Session",
                "Left room {} (joined: {}, {} remote participants)",
                connection.room_id,
                connection.joined,
                connection.remote_participants.len()
            );
        }
        self.engine.shutdown();
        self.state = RoomState::Uninitialized;
    }

    /// Returns whether the surface was bound.
    pub fn attach_local_surface(&mut self, surface: RenderSurface) -> bool {
        if !self.is_joined() {
            debug!(target: "Room/Session", "Ignoring local surface, not joined");
            return false;
        }
        self.engine.engine().set_local_surface(surface);
        true
    }

    /// Returns whether the surface was bound.
    pub fn attach_remote_surface(&mut self, user_id: &str, surface: RenderSurface) -> bool {
        if !self.is_joined() {
            debug!(target: "Room/Session", "Ignoring remote surface for {user_id}, not joined");
            return false;
        }
        let room_id = self.current_room();
        self.engine
            .engine()
            .set_remote_surface(&room_id, user_id, surface);
        true
    }

    pub fn mute_local_audio(&mut self, muted: bool) -> Result<(), RoomError> {
        let connection = self.joined_connection()?;
        connection.audio_muted = muted;
        self.engine.engine().set_audio_capture(!muted);
        Ok(())
    }

    pub fn mute_local_video(&mut self, muted: bool) -> Result<(), RoomError> {
        let connection = self.joined_connection()?;
        connection.video_muted = muted;
        self.engine.engine().set_video_capture(!muted);
        Ok(())
    }

    /// Flip between front and back camera, returning the new facing.
    pub fn switch_camera(&mut self) -> Result<CameraFacing, RoomError> {
        let connection = self.joined_connection()?;
        connection.camera = connection.camera.toggled();
        let facing = connection.camera;
        self.engine.engine().switch_camera(facing);
        Ok(facing)
    }

    /// Apply one queued engine notification.
    ///
    /// Returns the event to forward to the coordinator, or `None` when the
    /// notification is stale (another room, cancelled join) or a duplicate.
    pub fn handle_engine_event(&mut self, event: EngineEvent) -> Option<RoomEvent> {
        let in_room = matches!(self.state, RoomState::Joining | RoomState::Joined);

        match event {
            EngineEvent::JoinResult { room_id, result } => {
                if self.state != RoomState::Joining || !self.is_current_room(&room_id) {
                    debug!(target: "Room/Session", "Ignoring stale join result for room {room_id}");
                    return None;
                }
                match result {
                    Ok(()) => {
                        let connection = self.connection.as_mut()?;
                        connection.joined = true;
                        self.state = RoomState::Joined;
                        info!(target: "Room/Session", "Joined room {room_id}");
                        Some(RoomEvent {
                            call_id: connection.call_id.clone(),
                            kind: RoomEventKind::LocalJoinSuccess,
                        })
                    }
                    Err(reason) => Some(self.fail_join(reason)),
                }
            }
            EngineEvent::RemoteJoined { room_id, user_id } => {
                if !in_room || !self.is_current_room(&room_id) {
                    debug!(target: "Room/Session", "Ignoring stale join of {user_id} in {room_id}");
                    return None;
                }
                let connection = self.connection.as_mut()?;
                if user_id == connection.local_user_id
                    || !connection.remote_participants.insert(user_id.clone())
                {
                    return None;
                }
                debug!(target: "Room/Session", "Remote {user_id} joined {room_id}");
                Some(RoomEvent {
                    call_id: connection.call_id.clone(),
                    kind: RoomEventKind::RemoteJoined(user_id),
                })
            }
            EngineEvent::RemoteLeft { room_id, user_id } => {
                if !in_room || !self.is_current_room(&room_id) {
                    debug!(target: "Room/Session", "Ignoring stale leave of {user_id} in {room_id}");
                    return None;
                }
                let connection = self.connection.as_mut()?;
                if !connection.remote_participants.remove(&user_id) {
                    return None;
                }
                debug!(target: "Room/Session", "Remote {user_id} left {room_id}");
                Some(RoomEvent {
                    call_id: connection.call_id.clone(),
                    kind: RoomEventKind::RemoteLeft(user_id),
                })
            }
            EngineEvent::Error { code } => {
                if !in_room {
                    debug!(target: "Room/Session", "Ignoring engine error {code} outside a room");
                    return None;
                }
                warn!(target: "Room/Session", "Media engine error {code}");
                if self.state == RoomState::Joining && JoinFailureReason::is_join_fatal_code(code) {
                    return Some(self.fail_join(JoinFailureReason::from_engine_code(code)));
                }
                let connection = self.connection.as_ref()?;
                Some(RoomEvent {
                    call_id: connection.call_id.clone(),
                    kind: RoomEventKind::EngineError(code),
                })
            }
        }
    }

    /// The connection is kept (not joined) so `leave` still releases the
    /// engine-side room.
    fn fail_join(&mut self, reason: JoinFailureReason) -> RoomEvent {
        self.state = RoomState::Initialized;
        let (call_id, room_id) = match self.connection.as_mut() {
            Some(c) => {
                c.joined = false;
                c.remote_participants.clear();
                (c.call_id.clone(), c.room_id.clone())
            }
            None => (CallId::new(""), String::new()),
        };
        warn!(target: "Room/Session", "Join of room {room_id} failed: {reason}");
        RoomEvent {
            call_id,
            kind: RoomEventKind::LocalJoinFailure(reason),
        }
    }

    fn joined_connection(&mut self) -> Result<&mut RoomConnection, RoomError> {
        if self.state != RoomState::Joined {
            return Err(RoomError::NotJoined);
        }
        self.connection.as_mut().ok_or(RoomError::NotJoined)
    }

    fn is_current_room(&self, room_id: &str) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.room_id == room_id)
    }

    fn current_room(&self) -> String {
        self.connection
            .as_ref()
            .map(|c| c.room_id.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for RoomSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSessionManager")
            .field("engine", &self.engine)
            .field("state", &self.state)
            .field("connection", &self.connection)
            .finish()
    }
}
