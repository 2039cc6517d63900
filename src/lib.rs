//! Runtime side of the one-to-one call stack: the call coordinator, the media
//! room session and the call duration clock.
//!
//! Pure pieces (access tokens, the call state table, signaling messages)
//! live in `meetcore` and are re-exported here.

pub use meetcore::{
    AccessToken, CallId, CallRole, CallState, CallTrigger, EndReason, InvalidTransition,
    PrivilegeGrant, PrivilegeKind, TokenError, signaling, token,
};

pub mod calls;
pub mod config;
pub mod duration;
pub mod room;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use calls::{CallCoordinator, CallError, CallEvent, CallSession, SignalingChannel};
pub use config::CallCoordinatorConfig;
pub use duration::DurationTracker;
pub use room::{MediaEngine, MediaEngineHandle, RoomSessionManager};
