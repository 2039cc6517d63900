//! Call state table.
//!
//! This is the only place call states change. The coordinator maps every
//! command, signal, room event and timer onto a [`CallTrigger`] and asks
//! [`CallState::on`] for the next state.

use serde::Serialize;

/// Stage of the (single) call on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum CallState {
    /// No call.
    #[default]
    Idle,
    /// Outgoing invite sent, waiting for the callee.
    RingingOutbound,
    /// Incoming invite shown locally.
    RingingInbound,
    /// Accepted, joining the media room.
    Connecting,
    /// Both peers are in the room.
    Active,
    /// Terminal; teardown in progress.
    Ended,
}

impl CallState {
    pub fn is_ringing(self) -> bool {
        matches!(self, Self::RingingOutbound | Self::RingingInbound)
    }

    /// States that end on their own after a while if nothing happens.
    pub fn has_timeout(self) -> bool {
        matches!(
            self,
            Self::RingingOutbound | Self::RingingInbound | Self::Connecting
        )
    }

    /// A call exists and has not ended yet.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Idle | Self::Ended)
    }

    /// Apply `trigger`, returning the next state.
    pub fn on(self, trigger: CallTrigger) -> Result<CallState, InvalidTransition> {
        use CallState::*;
        use CallTrigger::*;

        let next = match (self, trigger) {
            (Idle, StartOutgoingCall) => RingingOutbound,
            (Idle, IncomingCallOffer) => RingingInbound,

            (RingingOutbound, RemoteAccepted) => Connecting,
            (RingingOutbound, RemoteRejected | RemoteBusy | Timeout | LocalCancel) => Ended,

            (RingingInbound, LocalAccept) => Connecting,
            (RingingInbound, LocalReject | Timeout | RemoteCancel) => Ended,

            (Connecting, MediaConnected) => Active,
            (
                Connecting,
                JoinFailed | Timeout | LocalHangup | RemoteHangup | EngineError,
            ) => Ended,

            (Active, RemoteLeft | LocalHangup | RemoteHangup | EngineError) => Ended,

            (Ended, TeardownComplete) => Idle,

            (current, attempted) => {
                return Err(InvalidTransition { current, attempted });
            }
        };
        Ok(next)
    }
}

/// Everything that can move a call between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTrigger {
    StartOutgoingCall,
    IncomingCallOffer,
    RemoteAccepted,
    RemoteRejected,
    RemoteBusy,
    LocalCancel,
    LocalAccept,
    LocalReject,
    RemoteCancel,
    /// Local join succeeded and the peer is present in the room.
    MediaConnected,
    JoinFailed,
    Timeout,
    RemoteLeft,
    LocalHangup,
    RemoteHangup,
    EngineError,
    TeardownComplete,
}

impl CallTrigger {
    pub const ALL: [CallTrigger; 17] = [
        Self::StartOutgoingCall,
        Self::IncomingCallOffer,
        Self::RemoteAccepted,
        Self::RemoteRejected,
        Self::RemoteBusy,
        Self::LocalCancel,
        Self::LocalAccept,
        Self::LocalReject,
        Self::RemoteCancel,
        Self::MediaConnected,
        Self::JoinFailed,
        Self::Timeout,
        Self::RemoteLeft,
        Self::LocalHangup,
        Self::RemoteHangup,
        Self::EngineError,
        Self::TeardownComplete,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub current: CallState,
    pub attempted: CallTrigger,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {:?} in state {:?}",
            self.attempted, self.current
        )
    }
}

impl std::error::Error for InvalidTransition {}
