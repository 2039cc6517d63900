use std::time::Duration;

use meetcall::calls::{CallCoordinator, CallError, CallEvent};
use meetcall::room::{JoinFailureReason, MediaEngineHandle, RoomError};
use meetcall::signaling::{SignalMessage, SignalType};
use meetcall::test_utils::{EngineCall, FakeMediaEngine, RecordingSignaling};
use meetcall::token::unix_now;
use meetcall::{AccessToken, CallCoordinatorConfig, CallId, CallState, EndReason};
use tokio::sync::mpsc;

const APP_ID: &str = "app-test";
const APP_KEY: &[u8] = b"app-key-for-tests";

struct Harness {
    fake: FakeMediaEngine,
    coord: CallCoordinator,
    signals: mpsc::UnboundedReceiver<SignalMessage>,
    ended: mpsc::UnboundedReceiver<(CallId, EndReason)>,
}

async fn harness(local_user: &str) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let fake = FakeMediaEngine::new();
    fake.auto_complete_joins(Ok(()));
    let (signaling, signals) = RecordingSignaling::new();
    let config = CallCoordinatorConfig::new(APP_ID, APP_KEY.to_vec(), local_user);
    let coord = CallCoordinator::spawn(config, MediaEngineHandle::new(fake.clone()), signaling);

    let (ended_tx, ended) = mpsc::unbounded_channel();
    coord
        .set_on_call_ended(move |id, reason| {
            let _ = ended_tx.send((id.clone(), reason));
        })
        .await
        .unwrap();

    Harness {
        fake,
        coord,
        signals,
        ended,
    }
}

/// alice calls bob, bob accepts and both join. Returns the call id.
async fn active_outgoing_call(h: &mut Harness) -> CallId {
    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    let request = h.signals.recv().await.unwrap();
    assert_eq!(request.signal_type, SignalType::CallRequest);

    h.coord
        .receive_signal(SignalMessage::call_accept(
            &call_id,
            "bob",
            "alice",
            call_id.room_id(),
        ))
        .await
        .unwrap();
    h.fake.remote_join(call_id.room_id(), "bob");
    assert_eq!(h.coord.current_state().await.unwrap(), CallState::Active);
    call_id
}

async fn assert_no_more_ended(h: &mut Harness) {
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.ended.try_recv().is_err(), "ended callback fired twice");
}

#[tokio::test(start_paused = true)]
async fn test_outgoing_call_full_lifecycle() {
    let mut h = harness("alice").await;
    let (tick_tx, mut ticks) = mpsc::unbounded_channel();
    h.coord
        .set_on_tick(move |s| {
            let _ = tick_tx.send(s);
        })
        .await
        .unwrap();

    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    assert!(call_id.as_str().starts_with("call_"));
    assert!(call_id.as_str().ends_with("_alice"));
    assert_eq!(
        h.coord.current_state().await.unwrap(),
        CallState::RingingOutbound
    );

    let request = h.signals.recv().await.unwrap();
    assert_eq!(request.signal_type, SignalType::CallRequest);
    assert_eq!(request.to_user_id, "bob");
    assert_eq!(request.room(), call_id.room_id());

    h.coord
        .receive_signal(SignalMessage::call_accept(
            &call_id,
            "bob",
            "alice",
            call_id.room_id(),
        ))
        .await
        .unwrap();
    assert_eq!(h.coord.current_state().await.unwrap(), CallState::Connecting);

    // The room was joined with a token minted for this call.
    let raw = h.fake.last_token().expect("join_room was called");
    let token = AccessToken::parse(&raw).unwrap();
    assert_eq!(token.verify(APP_KEY, unix_now()), Ok(()));
    assert_eq!(token.room_id(), call_id.room_id());
    assert_eq!(token.user_id(), "alice");

    h.fake.remote_join(call_id.room_id(), "bob");
    assert_eq!(h.coord.current_state().await.unwrap(), CallState::Active);

    for expected in 1..=3 {
        assert_eq!(ticks.recv().await, Some(expected));
    }

    h.fake.remote_leave(call_id.room_id(), "bob");
    assert_eq!(
        h.ended.recv().await,
        Some((call_id.clone(), EndReason::RemoteHangup))
    );
    assert_eq!(h.coord.current_state().await.unwrap(), CallState::Idle);
    assert_eq!(h.coord.current_call_id().await.unwrap(), None);

    assert_eq!(h.fake.count(|c| *c == EngineCall::LeaveRoom), 1);
    assert_eq!(h.fake.count(|c| *c == EngineCall::Destroy), 1);

    assert_no_more_ended(&mut h).await;
    // The peer left on its own, so nothing is sent back.
    assert!(h.signals.try_recv().is_err());
    // The clock stopped with the call.
    while let Ok(s) = ticks.try_recv() {
        assert!(s <= 3, "tick {s} after the call ended");
    }
}

#[tokio::test(start_paused = true)]
async fn test_end_call_twice_fires_callback_once() {
    let mut h = harness("alice").await;
    let call_id = active_outgoing_call(&mut h).await;

    h.coord.end_call().await.unwrap();
    h.coord.end_call().await.unwrap();

    assert_eq!(
        h.ended.recv().await,
        Some((call_id.clone(), EndReason::LocalHangup))
    );
    let end = h.signals.recv().await.unwrap();
    assert_eq!(end.signal_type, SignalType::CallEnd);
    assert_eq!(end.call_id, call_id);
    assert_eq!(end.to_user_id, "bob");

    assert_no_more_ended(&mut h).await;
    assert!(h.signals.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_end_call_when_idle_is_noop() {
    let mut h = harness("alice").await;
    h.coord.end_call().await.unwrap();
    assert_no_more_ended(&mut h).await;
    assert!(h.fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_call_times_out() {
    let mut h = harness("alice").await;
    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    let _request = h.signals.recv().await.unwrap();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(
        h.coord.current_state().await.unwrap(),
        CallState::RingingOutbound
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.ended.recv().await, Some((call_id.clone(), EndReason::Timeout)));

    let timeout = h.signals.recv().await.unwrap();
    assert_eq!(timeout.signal_type, SignalType::CallTimeout);
    assert_eq!(timeout.call_id, call_id);
    // Never got as far as the media engine.
    assert!(h.fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_when_peer_never_joins() {
    let mut h = harness("alice").await;
    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    h.coord
        .receive_signal(SignalMessage::call_accept(
            &call_id,
            "bob",
            "alice",
            call_id.room_id(),
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.ended.recv().await, Some((call_id, EndReason::Timeout)));
    assert_eq!(h.fake.count(|c| *c == EngineCall::LeaveRoom), 1);
}

#[tokio::test(start_paused = true)]
async fn test_join_failure_still_leaves_room() {
    let mut h = harness("alice").await;
    h.fake
        .auto_complete_joins(Err(JoinFailureReason::TokenRejected));
    let mut events = h.coord.subscribe();

    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    h.coord
        .receive_signal(SignalMessage::call_accept(
            &call_id,
            "bob",
            "alice",
            call_id.room_id(),
        ))
        .await
        .unwrap();

    assert_eq!(
        h.ended.recv().await,
        Some((call_id.clone(), EndReason::JoinFailed))
    );
    assert_eq!(h.fake.count(|c| *c == EngineCall::LeaveRoom), 1);
    assert_eq!(h.fake.count(|c| *c == EngineCall::Destroy), 1);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let CallEvent::LocalJoinFailed { reason, .. } = event {
            assert_eq!(reason, JoinFailureReason::TokenRejected);
            saw_failure = true;
        }
    }
    assert!(saw_failure);

    let request = h.signals.recv().await.unwrap();
    assert_eq!(request.signal_type, SignalType::CallRequest);
    let end = h.signals.recv().await.unwrap();
    assert_eq!(end.signal_type, SignalType::CallEnd);
}

#[tokio::test(start_paused = true)]
async fn test_remote_reject_and_busy() {
    let mut h = harness("alice").await;

    let first = h.coord.start_outgoing_call("bob").await.unwrap();
    h.coord
        .receive_signal(SignalMessage::call_reject(&first, "bob", "alice", None))
        .await
        .unwrap();
    assert_eq!(h.ended.recv().await, Some((first, EndReason::Rejected)));

    let second = h.coord.start_outgoing_call("bob").await.unwrap();
    h.coord
        .receive_signal(SignalMessage::call_busy(&second, "bob", "alice"))
        .await
        .unwrap();
    assert_eq!(h.ended.recv().await, Some((second, EndReason::Busy)));
}

#[tokio::test(start_paused = true)]
async fn test_incoming_call_accept_then_remote_hangup() {
    let mut h = harness("bob").await;
    let mut events = h.coord.subscribe();
    let call_id = CallId::new("call_1700000000000_alice");

    h.coord
        .receive_signal(
            SignalMessage::call_request(&call_id, "alice", "bob")
                .with_extra("callerName", "Alice"),
        )
        .await
        .unwrap();
    assert_eq!(
        h.coord.current_state().await.unwrap(),
        CallState::RingingInbound
    );

    let mut incoming = None;
    while let Ok(event) = events.try_recv() {
        if let CallEvent::IncomingCall {
            from_user_id,
            caller_name,
            ..
        } = event
        {
            incoming = Some((from_user_id, caller_name));
        }
    }
    assert_eq!(
        incoming,
        Some(("alice".to_string(), Some("Alice".to_string())))
    );

    h.coord.accept_incoming().await.unwrap();
    let accept = h.signals.recv().await.unwrap();
    assert_eq!(accept.signal_type, SignalType::CallAccept);
    assert_eq!(accept.room(), call_id.room_id());

    h.fake.remote_join(call_id.room_id(), "alice");
    assert_eq!(h.coord.current_state().await.unwrap(), CallState::Active);

    h.coord
        .receive_signal(SignalMessage::call_end(&call_id, "alice", "bob"))
        .await
        .unwrap();
    assert_eq!(
        h.ended.recv().await,
        Some((call_id, EndReason::RemoteHangup))
    );
    assert_eq!(h.fake.count(|c| *c == EngineCall::LeaveRoom), 1);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.signals.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reject_incoming() {
    let mut h = harness("bob").await;
    assert!(matches!(
        h.coord.accept_incoming().await,
        Err(CallError::InvalidState {
            state: CallState::Idle,
            ..
        })
    ));

    let call_id = CallId::new("call_1_alice");
    h.coord
        .receive_signal(SignalMessage::call_request(&call_id, "alice", "bob"))
        .await
        .unwrap();
    h.coord.reject_incoming().await.unwrap();

    assert_eq!(h.ended.recv().await, Some((call_id.clone(), EndReason::Rejected)));
    let reject = h.signals.recv().await.unwrap();
    assert_eq!(reject.signal_type, SignalType::CallReject);
    assert_eq!(reject.to_user_id, "alice");
    assert!(h.fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_call_while_busy() {
    let mut h = harness("alice").await;
    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    let _request = h.signals.recv().await.unwrap();

    assert_eq!(
        h.coord.start_outgoing_call("carol").await,
        Err(CallError::AlreadyInCall(call_id.clone()))
    );

    let intruder = CallId::new("call_5_carol");
    assert_eq!(
        h.coord
            .receive_signal(SignalMessage::call_request(&intruder, "carol", "alice"))
            .await,
        Err(CallError::AlreadyInCall(call_id.clone()))
    );
    let busy = h.signals.recv().await.unwrap();
    assert_eq!(busy.signal_type, SignalType::CallBusy);
    assert_eq!(busy.call_id, intruder);
    assert_eq!(busy.to_user_id, "carol");

    assert_eq!(h.coord.current_call_id().await.unwrap(), Some(call_id));
    assert_eq!(
        h.coord.current_state().await.unwrap(),
        CallState::RingingOutbound
    );
}

#[tokio::test(start_paused = true)]
async fn test_stale_signals_and_timeouts_are_ignored() {
    let mut h = harness("alice").await;

    // First call: incoming from bob, declined after 30s.
    let first = CallId::new("call_1_bob");
    h.coord
        .receive_signal(SignalMessage::call_request(&first, "bob", "alice"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    h.coord.reject_incoming().await.unwrap();
    assert_eq!(h.ended.recv().await, Some((first.clone(), EndReason::Rejected)));

    // Second call: outgoing to bob.
    let second = h.coord.start_outgoing_call("bob").await.unwrap();
    assert_ne!(second, first);

    // A late hangup for the first call must not touch the second.
    h.coord
        .receive_signal(SignalMessage::call_end(&first, "bob", "alice"))
        .await
        .unwrap();
    // Same call id from the wrong peer is ignored too.
    h.coord
        .receive_signal(SignalMessage::call_cancel(&second, "mallory", "alice"))
        .await
        .unwrap();

    // The first call's ring timeout would have fired at t=60.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(
        h.coord.current_state().await.unwrap(),
        CallState::RingingOutbound
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.ended.recv().await, Some((second, EndReason::Timeout)));
    assert_no_more_ended(&mut h).await;
}

#[tokio::test(start_paused = true)]
async fn test_media_controls_follow_room_state() {
    let mut h = harness("alice").await;
    assert!(matches!(
        h.coord.mute_local_audio(true).await,
        Err(CallError::InvalidState { .. })
    ));

    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    assert_eq!(
        h.coord.mute_local_audio(true).await,
        Err(CallError::Room(RoomError::NotJoined))
    );
    h.coord.end_call().await.unwrap();
    assert_eq!(h.ended.recv().await, Some((call_id, EndReason::LocalHangup)));
    let _request = h.signals.recv().await.unwrap();
    let cancel = h.signals.recv().await.unwrap();
    assert_eq!(cancel.signal_type, SignalType::CallCancel);

    active_outgoing_call(&mut h).await;
    h.coord.mute_local_audio(true).await.unwrap();
    h.coord.mute_local_video(true).await.unwrap();
    h.coord.switch_camera().await.unwrap();
    assert!(h.fake.calls().contains(&EngineCall::AudioCapture(false)));
    assert!(h.fake.calls().contains(&EngineCall::VideoCapture(false)));

    let session = h.coord.current_session().await.unwrap().unwrap();
    assert!(session.local_joined && session.remote_present);
    assert!(session.connected_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_coordinator_ends_live_call() {
    let mut h = harness("alice").await;
    let call_id = active_outgoing_call(&mut h).await;

    drop(h.coord);

    assert_eq!(h.ended.recv().await, Some((call_id, EndReason::LocalHangup)));
    assert_eq!(h.fake.count(|c| *c == EngineCall::LeaveRoom), 1);
    let end = h.signals.recv().await.unwrap();
    assert_eq!(end.signal_type, SignalType::CallEnd);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_coordinator() {
    let h = harness("alice").await;
    let other = h.coord.clone();
    h.coord.shutdown().await.unwrap();
    assert_eq!(
        other.start_outgoing_call("bob").await,
        Err(CallError::Stopped)
    );
}

#[tokio::test(start_paused = true)]
async fn test_signaling_failure_does_not_block_the_call() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fake = FakeMediaEngine::new();
    fake.auto_complete_joins(Ok(()));
    let (signaling, _signals) = RecordingSignaling::new();
    signaling.set_failing(true);
    let coord = CallCoordinator::spawn(
        CallCoordinatorConfig::new(APP_ID, APP_KEY.to_vec(), "alice"),
        MediaEngineHandle::new(fake.clone()),
        signaling,
    );

    let call_id = coord.start_outgoing_call("bob").await.unwrap();
    coord
        .receive_signal(SignalMessage::call_accept(
            &call_id,
            "bob",
            "alice",
            call_id.room_id(),
        ))
        .await
        .unwrap();
    fake.remote_join(call_id.room_id(), "bob");
    assert_eq!(coord.current_state().await.unwrap(), CallState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_engine_create_failure_ends_call() {
    let mut h = harness("alice").await;
    h.fake.fail_create();

    let call_id = h.coord.start_outgoing_call("bob").await.unwrap();
    h.coord
        .receive_signal(SignalMessage::call_accept(
            &call_id,
            "bob",
            "alice",
            call_id.room_id(),
        ))
        .await
        .unwrap();

    assert_eq!(h.ended.recv().await, Some((call_id, EndReason::JoinFailed)));
    assert!(h.fake.calls().is_empty());
    assert_eq!(h.coord.current_state().await.unwrap(), CallState::Idle);
}
