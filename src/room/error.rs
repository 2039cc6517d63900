//! Room-related error types.

use thiserror::Error;

use super::engine::EngineError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("media engine already initialized for app {current}")]
    EngineBusy { current: String },

    #[error("app id must not be blank")]
    InvalidAppId,

    #[error("media engine not initialized")]
    NotInitialized,

    #[error("already in room {0}")]
    AlreadyInRoom(String),

    #[error("join already in progress for room {0}")]
    JoinInProgress(String),

    #[error("not joined to a room")]
    NotJoined,

    #[error(transparent)]
    Engine(#[from] EngineError),
}
