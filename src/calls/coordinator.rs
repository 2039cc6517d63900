//! Call lifecycle coordination.
//!
//! [`CallCoordinator`] is a cheap, cloneable handle. All call state lives in
//! a single [`CoordinatorActor`] task which drains four queues: commands from
//! handles, engine notifications, duration ticks and timeouts. Every state
//! change happens on that task, so no locks guard the session.

use std::sync::Arc;

use log::{debug, error, info, warn};
use meetcore::duration::format_mm_ss;
use meetcore::signaling::{EXTRA_CALLER_NAME, SignalMessage, SignalType};
use meetcore::{AccessToken, CallId, CallState, CallTrigger, EndReason, PrivilegeGrant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::CallError;
use super::events::CallEvent;
use super::messages::{CallEndedCallback, CallTimeout, CoordinatorCommand, TimeoutStage};
use super::session::CallSession;
use super::signaling::SignalingChannel;
use crate::config::CallCoordinatorConfig;
use crate::duration::{DurationTick, DurationTracker, TickCallback};
use crate::room::{
    CameraFacing, EngineEvent, MediaEngineHandle, RenderSurface, RoomEvent, RoomEventKind,
    RoomSessionManager, engine_event_channel,
};

/// Reason sent with a CALL_REJECT when the local user declines.
const REJECT_REASON_DECLINED: &str = "declined";

/// Handle to the call coordination task.
///
/// When the last handle is dropped the task tears down any live call (the
/// ended callback still fires with `LocalHangup`) and exits.
#[derive(Clone)]
pub struct CallCoordinator {
    command_tx: mpsc::Sender<CoordinatorCommand>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl CallCoordinator {
    /// Spawn the coordination task on the current tokio runtime.
    pub fn spawn(
        config: CallCoordinatorConfig,
        engine: MediaEngineHandle,
        signaling: Arc<dyn SignalingChannel>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        let (engine_tx, engine_rx) = engine_event_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

        tokio::spawn(signal_outbox(outbox_rx, signaling));

        let actor = CoordinatorActor {
            room: RoomSessionManager::new(engine, engine_tx),
            tracker: DurationTracker::new(tick_tx),
            config,
            session: None,
            on_call_ended: None,
            pending_timeout: None,
            command_rx,
            engine_rx,
            tick_rx,
            timer_rx,
            timer_tx,
            outbox_tx,
            event_tx: event_tx.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            command_tx,
            event_tx,
        }
    }

    /// Subscribe to [`CallEvent`]s. Slow receivers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorCommand,
    ) -> Result<T, CallError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .await
            .map_err(|_| CallError::Stopped)?;
        rx.await.map_err(|_| CallError::Stopped)
    }

    /// Invite `remote_user_id`. Fails with `AlreadyInCall` unless idle.
    pub async fn start_outgoing_call(&self, remote_user_id: &str) -> Result<CallId, CallError> {
        let remote_user_id = remote_user_id.to_string();
        self.request(|reply| CoordinatorCommand::StartOutgoingCall {
            remote_user_id,
            reply,
        })
        .await?
    }

    pub async fn accept_incoming(&self) -> Result<(), CallError> {
        self.request(|reply| CoordinatorCommand::AcceptIncoming { reply })
            .await?
    }

    pub async fn reject_incoming(&self) -> Result<(), CallError> {
        self.request(|reply| CoordinatorCommand::RejectIncoming { reply })
            .await?
    }

    /// Hang up, cancel or decline whatever call exists. No-op when idle.
    pub async fn end_call(&self) -> Result<(), CallError> {
        self.request(|reply| CoordinatorCommand::EndCall { reply })
            .await
    }

    /// Feed an inbound signaling message.
    pub async fn receive_signal(&self, message: SignalMessage) -> Result<(), CallError> {
        self.request(|reply| CoordinatorCommand::ReceiveSignal { message, reply })
            .await?
    }

    pub async fn mute_local_audio(&self, muted: bool) -> Result<(), CallError> {
        self.request(|reply| CoordinatorCommand::MuteLocalAudio { muted, reply })
            .await?
    }

    pub async fn mute_local_video(&self, muted: bool) -> Result<(), CallError> {
        self.request(|reply| CoordinatorCommand::MuteLocalVideo { muted, reply })
            .await?
    }

    pub async fn switch_camera(&self) -> Result<CameraFacing, CallError> {
        self.request(|reply| CoordinatorCommand::SwitchCamera { reply })
            .await?
    }

    /// Returns `false` if there is no joined room to render into.
    pub async fn attach_local_surface(&self, surface: RenderSurface) -> Result<bool, CallError> {
        self.request(|reply| CoordinatorCommand::AttachLocalSurface { surface, reply })
            .await
    }

    pub async fn attach_remote_surface(
        &self,
        user_id: &str,
        surface: RenderSurface,
    ) -> Result<bool, CallError> {
        let user_id = user_id.to_string();
        self.request(|reply| CoordinatorCommand::AttachRemoteSurface {
            user_id,
            surface,
            reply,
        })
        .await
    }

    pub async fn current_call_id(&self) -> Result<Option<CallId>, CallError> {
        self.request(CoordinatorCommand::CurrentCallId).await
    }

    pub async fn current_state(&self) -> Result<CallState, CallError> {
        self.request(CoordinatorCommand::CurrentState).await
    }

    pub async fn current_session(&self) -> Result<Option<CallSession>, CallError> {
        self.request(CoordinatorCommand::CurrentSession).await
    }

    /// Register the ended callback, replacing any previous one.
    pub async fn set_on_call_ended<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn(&CallId, EndReason) + Send + Sync + 'static,
    {
        let callback: CallEndedCallback = Arc::new(callback);
        self.request(|reply| CoordinatorCommand::SetOnCallEnded {
            callback: Some(callback),
            reply,
        })
        .await
    }

    /// Register the once-per-second callback for active calls.
    pub async fn set_on_tick<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let callback: TickCallback = Arc::new(callback);
        self.request(|reply| CoordinatorCommand::SetOnTick {
            callback: Some(callback),
            reply,
        })
        .await
    }

    /// Tear down any live call and stop the coordination task.
    pub async fn shutdown(&self) -> Result<(), CallError> {
        self.request(|reply| CoordinatorCommand::Shutdown { reply })
            .await
    }
}

impl std::fmt::Debug for CallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCoordinator")
            .field("closed", &self.command_tx.is_closed())
            .finish()
    }
}

/// Delivers outbound signals one at a time, in the order they were queued.
async fn signal_outbox(
    mut outbox_rx: mpsc::UnboundedReceiver<SignalMessage>,
    signaling: Arc<dyn SignalingChannel>,
) {
    while let Some(message) = outbox_rx.recv().await {
        let kind = message.signal_type;
        let call_id = message.call_id.clone();
        match signaling.send(message).await {
            Ok(()) => debug!(target: "Call/Signaling", "Sent {kind:?} for {call_id}"),
            Err(e) => warn!(target: "Call/Signaling", "Failed to send {kind:?} for {call_id}: {e}"),
        }
    }
    debug!(target: "Call/Signaling", "Signal outbox closed");
}

/// Signal sent to the peer when this side ends the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notify {
    Nothing,
    Cancel,
    Reject,
    End,
    Timeout,
}

struct CoordinatorActor {
    config: CallCoordinatorConfig,
    room: RoomSessionManager,
    tracker: DurationTracker,
    session: Option<CallSession>,
    on_call_ended: Option<CallEndedCallback>,
    pending_timeout: Option<JoinHandle<()>>,

    command_rx: mpsc::Receiver<CoordinatorCommand>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    tick_rx: mpsc::UnboundedReceiver<DurationTick>,
    timer_rx: mpsc::UnboundedReceiver<CallTimeout>,
    timer_tx: mpsc::UnboundedSender<CallTimeout>,
    outbox_tx: mpsc::UnboundedSender<SignalMessage>,
    event_tx: broadcast::Sender<CallEvent>,
}

impl CoordinatorActor {
    async fn run(mut self) {
        info!(target: "Call/Coordinator", "Call coordinator started for {}", self.config.local_user_id);
        loop {
            tokio::select! {
                biased;
                Some(event) = self.engine_rx.recv() => self.handle_engine_event(event),
                Some(timeout) = self.timer_rx.recv() => self.handle_timeout(timeout),
                Some(tick) = self.tick_rx.recv() => self.handle_tick(tick),
                command = self.command_rx.recv() => match command {
                    Some(CoordinatorCommand::Shutdown { reply }) => {
                        self.stop();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(target: "Call/Coordinator", "All handles dropped");
                        self.stop();
                        break;
                    }
                },
            }
        }
        info!(target: "Call/Coordinator", "Call coordinator stopped");
    }

    fn handle_command(&mut self, command: CoordinatorCommand) {
        debug!(target: "Call/Coordinator", "Command {}", command.name());
        match command {
            CoordinatorCommand::StartOutgoingCall {
                remote_user_id,
                reply,
            } => {
                let _ = reply.send(self.start_outgoing_call(&remote_user_id));
            }
            CoordinatorCommand::AcceptIncoming { reply } => {
                let _ = reply.send(self.accept_incoming());
            }
            CoordinatorCommand::RejectIncoming { reply } => {
                let _ = reply.send(self.reject_incoming());
            }
            CoordinatorCommand::EndCall { reply } => {
                self.end_call();
                let _ = reply.send(());
            }
            CoordinatorCommand::ReceiveSignal { message, reply } => {
                let _ = reply.send(self.receive_signal(message));
            }
            CoordinatorCommand::MuteLocalAudio { muted, reply } => {
                let result = self
                    .require_session("mute_local_audio")
                    .and_then(|_| self.room.mute_local_audio(muted).map_err(CallError::from));
                let _ = reply.send(result);
            }
            CoordinatorCommand::MuteLocalVideo { muted, reply } => {
                let result = self
                    .require_session("mute_local_video")
                    .and_then(|_| self.room.mute_local_video(muted).map_err(CallError::from));
                let _ = reply.send(result);
            }
            CoordinatorCommand::SwitchCamera { reply } => {
                let result = self
                    .require_session("switch_camera")
                    .and_then(|_| self.room.switch_camera().map_err(CallError::from));
                let _ = reply.send(result);
            }
            CoordinatorCommand::AttachLocalSurface { surface, reply } => {
                let _ = reply.send(self.room.attach_local_surface(surface));
            }
            CoordinatorCommand::AttachRemoteSurface {
                user_id,
                surface,
                reply,
            } => {
                let _ = reply.send(self.room.attach_remote_surface(&user_id, surface));
            }
            CoordinatorCommand::CurrentCallId(reply) => {
                let _ = reply.send(self.session.as_ref().map(|s| s.call_id.clone()));
            }
            CoordinatorCommand::CurrentState(reply) => {
                let _ = reply.send(self.state());
            }
            CoordinatorCommand::CurrentSession(reply) => {
                let _ = reply.send(self.session.clone());
            }
            CoordinatorCommand::SetOnCallEnded { callback, reply } => {
                self.on_call_ended = callback;
                let _ = reply.send(());
            }
            CoordinatorCommand::SetOnTick { callback, reply } => {
                self.tracker.set_on_tick(callback);
                let _ = reply.send(());
            }
            CoordinatorCommand::Shutdown { reply } => {
                // Handled by the run loop.
                let _ = reply.send(());
            }
        }
    }

    fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Idle)
    }

    fn require_session(&self, operation: &'static str) -> Result<(), CallError> {
        match &self.session {
            Some(_) => Ok(()),
            None => Err(CallError::InvalidState {
                state: CallState::Idle,
                operation,
            }),
        }
    }

    fn start_outgoing_call(&mut self, remote_user_id: &str) -> Result<CallId, CallError> {
        if let Some(session) = &self.session {
            return Err(CallError::AlreadyInCall(session.call_id.clone()));
        }
        let local = self.config.local_user_id.clone();
        if remote_user_id.trim().is_empty() || remote_user_id == local {
            return Err(CallError::InvalidPeer(remote_user_id.to_string()));
        }

        let call_id = CallId::generate(&local);
        let mut session = CallSession::outgoing(call_id.clone(), &local, remote_user_id);
        session.apply(CallTrigger::StartOutgoingCall)?;
        self.session = Some(session);
        self.emit_state_change(&call_id, CallState::Idle, CallState::RingingOutbound);

        let mut request = SignalMessage::call_request(&call_id, &local, remote_user_id);
        if let Some(name) = &self.config.display_name {
            request = request.with_extra(EXTRA_CALLER_NAME, name);
        }
        self.send_signal(request);
        self.arm_timeout(&call_id, TimeoutStage::Ringing);

        info!(target: "Call/Coordinator", "Calling {remote_user_id} ({call_id})");
        Ok(call_id)
    }

    fn accept_incoming(&mut self) -> Result<(), CallError> {
        let state = self.state();
        if state != CallState::RingingInbound {
            return Err(CallError::InvalidState {
                state,
                operation: "accept_incoming",
            });
        }
        let (call_id, room_id, remote) = self.transition(CallTrigger::LocalAccept)?;
        self.send_signal(SignalMessage::call_accept(
            &call_id,
            &self.config.local_user_id,
            &remote,
            &room_id,
        ));
        self.enter_connecting(&call_id);
        Ok(())
    }

    fn reject_incoming(&mut self) -> Result<(), CallError> {
        let state = self.state();
        if state != CallState::RingingInbound {
            return Err(CallError::InvalidState {
                state,
                operation: "reject_incoming",
            });
        }
        self.end_with(CallTrigger::LocalReject, EndReason::Rejected, Notify::Reject);
        Ok(())
    }

    fn end_call(&mut self) {
        match self.state() {
            CallState::RingingOutbound => {
                self.end_with(CallTrigger::LocalCancel, EndReason::LocalHangup, Notify::Cancel)
            }
            CallState::RingingInbound => {
                self.end_with(CallTrigger::LocalReject, EndReason::LocalHangup, Notify::Reject)
            }
            CallState::Connecting | CallState::Active => {
                self.end_with(CallTrigger::LocalHangup, EndReason::LocalHangup, Notify::End)
            }
            CallState::Idle | CallState::Ended => {
                debug!(target: "Call/Coordinator", "end_call with no live call, ignoring");
            }
        }
    }

    fn receive_signal(&mut self, message: SignalMessage) -> Result<(), CallError> {
        let local = self.config.local_user_id.clone();
        if message.to_user_id != local {
            return Err(CallError::InvalidPeer(message.to_user_id));
        }

        if message.signal_type == SignalType::CallRequest {
            return self.on_call_request(message);
        }

        let Some(session) = &self.session else {
            debug!(
                target: "Call/Coordinator",
                "Ignoring {:?} for {} with no live call",
                message.signal_type,
                message.call_id
            );
            return Ok(());
        };
        if session.call_id != message.call_id || session.remote_user_id != message.from_user_id {
            debug!(
                target: "Call/Coordinator",
                "Ignoring stale {:?} for {} (current {})",
                message.signal_type,
                message.call_id,
                session.call_id
            );
            return Ok(());
        }

        let state = session.state;
        match (message.signal_type, state) {
            (SignalType::CallAccept, CallState::RingingOutbound) => {
                let (call_id, _, _) = self.transition(CallTrigger::RemoteAccepted)?;
                self.enter_connecting(&call_id);
            }
            (SignalType::CallReject, CallState::RingingOutbound) => {
                self.end_with(CallTrigger::RemoteRejected, EndReason::Rejected, Notify::Nothing)
            }
            (SignalType::CallBusy, CallState::RingingOutbound) => {
                self.end_with(CallTrigger::RemoteBusy, EndReason::Busy, Notify::Nothing)
            }
            (SignalType::CallEnd, CallState::RingingOutbound) => self.end_with(
                CallTrigger::RemoteRejected,
                EndReason::RemoteHangup,
                Notify::Nothing,
            ),
            (SignalType::CallCancel | SignalType::CallEnd, CallState::RingingInbound) => self
                .end_with(
                    CallTrigger::RemoteCancel,
                    EndReason::RemoteHangup,
                    Notify::Nothing,
                ),
            (SignalType::CallCancel | SignalType::CallEnd, CallState::Connecting | CallState::Active) => {
                self.end_with(
                    CallTrigger::RemoteHangup,
                    EndReason::RemoteHangup,
                    Notify::Nothing,
                )
            }
            (
                SignalType::CallTimeout,
                CallState::RingingOutbound | CallState::RingingInbound | CallState::Connecting,
            ) => self.end_with(CallTrigger::Timeout, EndReason::Timeout, Notify::Nothing),
            (signal_type, state) => {
                debug!(
                    target: "Call/Coordinator",
                    "Ignoring {signal_type:?} in state {state:?}"
                );
            }
        }
        Ok(())
    }

    fn on_call_request(&mut self, message: SignalMessage) -> Result<(), CallError> {
        let local = self.config.local_user_id.clone();
        if let Some(session) = &self.session {
            if session.call_id == message.call_id {
                debug!(target: "Call/Coordinator", "Duplicate invite for {}", message.call_id);
                return Ok(());
            }
            let current = session.call_id.clone();
            info!(
                target: "Call/Coordinator",
                "Busy: rejecting {} from {} while in {current}",
                message.call_id,
                message.from_user_id
            );
            self.send_signal(SignalMessage::call_busy(
                &message.call_id,
                &local,
                &message.from_user_id,
            ));
            return Err(CallError::AlreadyInCall(current));
        }
        if message.from_user_id.trim().is_empty() || message.from_user_id == local {
            return Err(CallError::InvalidPeer(message.from_user_id));
        }

        let call_id = message.call_id.clone();
        let mut session =
            CallSession::incoming(call_id.clone(), message.room(), &local, &message.from_user_id);
        session.remote_display_name = message.extra_value(EXTRA_CALLER_NAME).map(str::to_string);
        session.apply(CallTrigger::IncomingCallOffer)?;
        let caller_name = session.remote_display_name.clone();
        self.session = Some(session);

        self.emit_state_change(&call_id, CallState::Idle, CallState::RingingInbound);
        self.emit(CallEvent::IncomingCall {
            call_id: call_id.clone(),
            from_user_id: message.from_user_id.clone(),
            caller_name,
        });
        self.arm_timeout(&call_id, TimeoutStage::Ringing);
        info!(target: "Call/Coordinator", "Incoming call {call_id} from {}", message.from_user_id);
        Ok(())
    }

    /// Apply `trigger` to the live session, returning (call id, room, remote).
    fn transition(&mut self, trigger: CallTrigger) -> Result<(CallId, String, String), CallError> {
        let Some(session) = self.session.as_mut() else {
            return Err(CallError::InvalidState {
                state: CallState::Idle,
                operation: "transition",
            });
        };
        let from = session.state;
        let to = session.apply(trigger)?;
        let ids = (
            session.call_id.clone(),
            session.room_id.clone(),
            session.remote_user_id.clone(),
        );
        self.emit_state_change(&ids.0, from, to);
        Ok(ids)
    }

    fn enter_connecting(&mut self, call_id: &CallId) {
        self.arm_timeout(call_id, TimeoutStage::Connecting);
        if let Err(e) = self.join_room() {
            warn!(target: "Call/Coordinator", "Could not start media for {call_id}: {e}");
            self.end_with(CallTrigger::JoinFailed, EndReason::JoinFailed, Notify::End);
        }
    }

    /// Mint a room token and ask the room manager to join.
    fn join_room(&mut self) -> Result<(), CallError> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let call_id = session.call_id.clone();
        let room_id = session.room_id.clone();
        let user_id = session.local_user_id.clone();

        let ttl = self.config.token_ttl;
        let token = AccessToken::issue(
            &self.config.app_id,
            &self.config.app_key,
            &room_id,
            &user_id,
            ttl,
            &PrivilegeGrant::call_participant(ttl),
        )?;

        self.room.init(&self.config.app_id)?;
        self.room
            .join(call_id, &room_id, &user_id, &token.serialize())?;
        Ok(())
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        if let Some(room_event) = self.room.handle_engine_event(event) {
            self.handle_room_event(room_event);
        }
    }

    fn handle_room_event(&mut self, event: RoomEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!(target: "Call/Coordinator", "Room event {:?} with no live call", event.kind);
            return;
        };
        if session.call_id != event.call_id {
            debug!(
                target: "Call/Coordinator",
                "Dropping room event for {} (current {})",
                event.call_id,
                session.call_id
            );
            return;
        }
        let call_id = event.call_id;

        match event.kind {
            RoomEventKind::LocalJoinSuccess => {
                session.local_joined = true;
                self.emit(CallEvent::LocalJoinSucceeded {
                    call_id: call_id.clone(),
                });
                self.maybe_activate(&call_id);
            }
            RoomEventKind::LocalJoinFailure(reason) => {
                session.local_joined = false;
                self.emit(CallEvent::LocalJoinFailed {
                    call_id: call_id.clone(),
                    reason,
                });
                if self.state() == CallState::Connecting {
                    self.end_with(CallTrigger::JoinFailed, EndReason::JoinFailed, Notify::End);
                }
            }
            RoomEventKind::RemoteJoined(user_id) => {
                if user_id != session.remote_user_id {
                    debug!(target: "Call/Coordinator", "Ignoring unexpected participant {user_id}");
                    return;
                }
                session.remote_present = true;
                self.emit(CallEvent::RemoteJoined {
                    call_id: call_id.clone(),
                    user_id,
                });
                self.maybe_activate(&call_id);
            }
            RoomEventKind::RemoteLeft(user_id) => {
                if user_id != session.remote_user_id {
                    return;
                }
                session.remote_present = false;
                let state = session.state;
                self.emit(CallEvent::RemoteLeft {
                    call_id: call_id.clone(),
                    user_id,
                });
                if state == CallState::Active {
                    self.end_with(CallTrigger::RemoteLeft, EndReason::RemoteHangup, Notify::Nothing);
                }
            }
            RoomEventKind::EngineError(code) => {
                if matches!(session.state, CallState::Connecting | CallState::Active) {
                    error!(target: "Call/Coordinator", "Media engine error {code} during {call_id}");
                    self.end_with(CallTrigger::EngineError, EndReason::Error, Notify::End);
                }
            }
        }
    }

    /// Connecting → Active once we are joined and the peer is present.
    fn maybe_activate(&mut self, call_id: &CallId) {
        let ready = self
            .session
            .as_ref()
            .is_some_and(|s| s.state == CallState::Connecting && s.media_ready());
        if !ready {
            return;
        }
        if let Err(e) = self.transition(CallTrigger::MediaConnected) {
            warn!(target: "Call/Coordinator", "Could not activate {call_id}: {e}");
            return;
        }
        self.cancel_timeout();
        self.tracker.start();
        info!(target: "Call/Coordinator", "Call {call_id} is active");
    }

    fn handle_timeout(&mut self, timeout: CallTimeout) {
        let Some(session) = &self.session else {
            return;
        };
        if session.call_id != timeout.call_id || !timeout.stage.matches(session.state) {
            debug!(target: "Call/Coordinator", "Dropping stale timeout {timeout:?}");
            return;
        }
        info!(
            target: "Call/Coordinator",
            "Call {} timed out while {:?}",
            timeout.call_id,
            session.state
        );
        let notify = match timeout.stage {
            TimeoutStage::Ringing => Notify::Timeout,
            TimeoutStage::Connecting => Notify::End,
        };
        self.end_with(CallTrigger::Timeout, EndReason::Timeout, notify);
    }

    fn handle_tick(&mut self, tick: DurationTick) {
        let Some(seconds) = self.tracker.on_tick(tick) else {
            return;
        };
        if let Some(session) = &self.session {
            let call_id = session.call_id.clone();
            self.emit(CallEvent::DurationTick { call_id, seconds });
        }
    }

    /// Move the live call to Ended and tear it down.
    ///
    /// Order: cancel the timeout, stop the clock, leave the room, notify the
    /// peer, fire the ended callback, then return to Idle.
    fn end_with(&mut self, trigger: CallTrigger, reason: EndReason, notify: Notify) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let from = session.state;
        if let Err(e) = session.apply(trigger) {
            warn!(target: "Call/Coordinator", "Cannot end call {}: {e}", session.call_id);
            return;
        }
        session.end_reason = Some(reason);
        let call_id = session.call_id.clone();
        let remote = session.remote_user_id.clone();
        let connected = session.connected_at.is_some();
        self.emit_state_change(&call_id, from, CallState::Ended);

        self.cancel_timeout();
        let duration_secs = if connected {
            self.tracker.elapsed_secs()
        } else {
            0
        };
        self.tracker.stop();
        self.room.leave();

        let local = self.config.local_user_id.as_str();
        let message = match notify {
            Notify::Nothing => None,
            Notify::Cancel => Some(SignalMessage::call_cancel(&call_id, local, &remote)),
            Notify::Reject => Some(SignalMessage::call_reject(
                &call_id,
                local,
                &remote,
                Some(REJECT_REASON_DECLINED),
            )),
            Notify::End => Some(SignalMessage::call_end(&call_id, local, &remote)),
            Notify::Timeout => Some(SignalMessage::call_timeout(&call_id, local, &remote)),
        };
        if let Some(message) = message {
            self.send_signal(message);
        }

        info!(
            target: "Call/Coordinator",
            "Call {call_id} ended: {reason} ({})",
            format_mm_ss(duration_secs)
        );
        if let Some(callback) = &self.on_call_ended {
            callback(&call_id, reason);
        }

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.apply(CallTrigger::TeardownComplete) {
                error!(target: "Call/Coordinator", "Teardown of {call_id} left bad state: {e}");
            }
        }
        self.emit_state_change(&call_id, CallState::Ended, CallState::Idle);
        self.emit(CallEvent::CallEnded {
            call_id,
            reason,
            duration_secs,
        });
    }

    /// Final teardown when the coordinator goes away.
    fn stop(&mut self) {
        self.end_call();
        self.cancel_timeout();
        self.tracker.stop();
        self.room.leave();
    }

    fn arm_timeout(&mut self, call_id: &CallId, stage: TimeoutStage) {
        self.cancel_timeout();
        let after = match stage {
            TimeoutStage::Ringing => self.config.ring_timeout,
            TimeoutStage::Connecting => self.config.connect_timeout,
        };
        let timeout = CallTimeout {
            call_id: call_id.clone(),
            stage,
        };
        let tx = self.timer_tx.clone();
        self.pending_timeout = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(timeout);
        }));
        debug!(target: "Call/Coordinator", "Armed {stage:?} timeout of {after:?} for {call_id}");
    }

    fn cancel_timeout(&mut self) {
        if let Some(handle) = self.pending_timeout.take() {
            handle.abort();
        }
    }

    fn send_signal(&self, message: SignalMessage) {
        if self.outbox_tx.send(message).is_err() {
            warn!(target: "Call/Signaling", "Signal outbox closed, dropping message");
        }
    }

    fn emit_state_change(&self, call_id: &CallId, from: CallState, to: CallState) {
        debug!(target: "Call/Coordinator", "{call_id}: {from:?} -> {to:?}");
        self.emit(CallEvent::StateChanged {
            call_id: call_id.clone(),
            from,
            to,
        });
    }

    fn emit(&self, event: CallEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

impl Drop for CoordinatorActor {
    fn drop(&mut self) {
        self.cancel_timeout();
    }
}
