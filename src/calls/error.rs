//! Call-related error types.

use meetcore::{CallId, CallState, InvalidTransition, TokenError};
use thiserror::Error;

use crate::room::RoomError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("already in call {0}")]
    AlreadyInCall(CallId),

    #[error("{operation} not allowed in state {state:?}")]
    InvalidState {
        state: CallState,
        operation: &'static str,
    },

    #[error("invalid peer: {0}")]
    InvalidPeer(String),

    #[error("room error: {0}")]
    Room(#[from] RoomError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("invalid call state transition: {0}")]
    Transition(#[from] InvalidTransition),

    #[error("call coordinator stopped")]
    Stopped,
}
