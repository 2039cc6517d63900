use std::sync::Arc;

use meetcore::signaling::SignalMessage;
use meetcore::{CallId, CallState, EndReason};
use tokio::sync::oneshot;

use super::error::CallError;
use super::session::CallSession;
use crate::duration::TickCallback;
use crate::room::{CameraFacing, RenderSurface};

pub type Reply<T> = oneshot::Sender<Result<T, CallError>>;

/// Invoked once per call, after teardown, on the coordination task.
pub type CallEndedCallback = Arc<dyn Fn(&CallId, EndReason) + Send + Sync>;

// --- Commands posted by CallCoordinator handles ---
pub enum CoordinatorCommand {
    StartOutgoingCall {
        remote_user_id: String,
        reply: Reply<CallId>,
    },
    AcceptIncoming {
        reply: Reply<()>,
    },
    RejectIncoming {
        reply: Reply<()>,
    },
    EndCall {
        reply: oneshot::Sender<()>,
    },
    ReceiveSignal {
        message: SignalMessage,
        reply: Reply<()>,
    },
    MuteLocalAudio {
        muted: bool,
        reply: Reply<()>,
    },
    MuteLocalVideo {
        muted: bool,
        reply: Reply<()>,
    },
    SwitchCamera {
        reply: Reply<CameraFacing>,
    },
    AttachLocalSurface {
        surface: RenderSurface,
        reply: oneshot::Sender<bool>,
    },
    AttachRemoteSurface {
        user_id: String,
        surface: RenderSurface,
        reply: oneshot::Sender<bool>,
    },
    CurrentCallId(oneshot::Sender<Option<CallId>>),
    CurrentState(oneshot::Sender<CallState>),
    CurrentSession(oneshot::Sender<Option<CallSession>>),
    SetOnCallEnded {
        callback: Option<CallEndedCallback>,
        reply: oneshot::Sender<()>,
    },
    SetOnTick {
        callback: Option<TickCallback>,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl CoordinatorCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartOutgoingCall { .. } => "start_outgoing_call",
            Self::AcceptIncoming { .. } => "accept_incoming",
            Self::RejectIncoming { .. } => "reject_incoming",
            Self::EndCall { .. } => "end_call",
            Self::ReceiveSignal { .. } => "receive_signal",
            Self::MuteLocalAudio { .. } => "mute_local_audio",
            Self::MuteLocalVideo { .. } => "mute_local_video",
            Self::SwitchCamera { .. } => "switch_camera",
            Self::AttachLocalSurface { .. } => "attach_local_surface",
            Self::AttachRemoteSurface { .. } => "attach_remote_surface",
            Self::CurrentCallId(_) => "current_call_id",
            Self::CurrentState(_) => "current_state",
            Self::CurrentSession(_) => "current_session",
            Self::SetOnCallEnded { .. } => "set_on_call_ended",
            Self::SetOnTick { .. } => "set_on_tick",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

impl std::fmt::Debug for CoordinatorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// --- Timers posted back to the coordinator ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    Ringing,
    Connecting,
}

impl TimeoutStage {
    /// Whether a timeout armed for this stage still applies in `state`.
    pub fn matches(self, state: CallState) -> bool {
        match self {
            Self::Ringing => state.is_ringing(),
            Self::Connecting => state == CallState::Connecting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTimeout {
    pub call_id: CallId,
    pub stage: TimeoutStage,
}
