use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Identifier of one call attempt.
///
/// Generated ids have the form `call_<unix-millis>_<caller>` and double as
/// the media room id, so both peers can derive the room from the invite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate(caller_user_id: &str) -> Self {
        Self(format!(
            "call_{}_{}",
            Utc::now().timestamp_millis(),
            caller_user_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Room the two peers meet in for this call.
    pub fn room_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Which side of the call this device is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallRole {
    Caller,
    Callee,
}

/// Why a call ended. Delivered exactly once per call through the
/// coordinator's ended callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    /// This device hung up or cancelled.
    LocalHangup,
    /// The peer hung up, cancelled or left the room.
    RemoteHangup,
    /// A ringing call was declined by either side.
    Rejected,
    /// The callee was already in another call.
    Busy,
    /// The media room could not be joined.
    JoinFailed,
    /// Ringing or connecting took too long.
    Timeout,
    /// The media engine reported a fatal error.
    Error,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LocalHangup => "local hangup",
            Self::RemoteHangup => "remote hangup",
            Self::Rejected => "rejected",
            Self::Busy => "busy",
            Self::JoinFailed => "join failed",
            Self::Timeout => "timeout",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}
