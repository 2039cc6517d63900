//! Media room session management.
//!
//! [`RoomSessionManager`] owns the single engine connection of a call:
//! init, join, leave, mute, camera and surface binding. Engine callbacks are
//! queued through an [`EngineEventSender`] and applied on the coordination
//! task, which turns them into call-tagged [`RoomEvent`]s.

mod engine;
mod error;
mod manager;

pub use engine::{
    CameraFacing, EngineError, EngineEvent, EngineEventSender, JoinFailureReason, MediaEngine,
    MediaEngineHandle, RenderSurface, engine_event_channel,
};
pub use error::RoomError;
pub use manager::{RoomConnection, RoomEvent, RoomEventKind, RoomSessionManager, RoomState};
