use meetcore::{CallId, CallState, EndReason};

use crate::room::JoinFailureReason;

/// Notifications for the presentation layer, published on the
/// coordinator's broadcast bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    StateChanged {
        call_id: CallId,
        from: CallState,
        to: CallState,
    },
    IncomingCall {
        call_id: CallId,
        from_user_id: String,
        caller_name: Option<String>,
    },
    LocalJoinSucceeded {
        call_id: CallId,
    },
    LocalJoinFailed {
        call_id: CallId,
        reason: JoinFailureReason,
    },
    RemoteJoined {
        call_id: CallId,
        user_id: String,
    },
    RemoteLeft {
        call_id: CallId,
        user_id: String,
    },
    DurationTick {
        call_id: CallId,
        seconds: u64,
    },
    CallEnded {
        call_id: CallId,
        reason: EndReason,
        duration_secs: u64,
    },
}

impl CallEvent {
    pub fn call_id(&self) -> &CallId {
        match self {
            Self::StateChanged { call_id, .. }
            | Self::IncomingCall { call_id, .. }
            | Self::LocalJoinSucceeded { call_id }
            | Self::LocalJoinFailed { call_id, .. }
            | Self::RemoteJoined { call_id, .. }
            | Self::RemoteLeft { call_id, .. }
            | Self::DurationTick { call_id, .. }
            | Self::CallEnded { call_id, .. } => call_id,
        }
    }
}
