// Integration test: two consecutive calls through one RoomSessionManager.
// The engine is destroyed on every leave and re-created for the next call.

use meetcall::room::{
    EngineEvent, MediaEngineHandle, RoomEventKind, RoomSessionManager, RoomState,
    engine_event_channel,
};
use meetcall::test_utils::{EngineCall, FakeMediaEngine};
use meetcall::CallId;
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(
    manager: &mut RoomSessionManager,
    rx: &mut UnboundedReceiver<EngineEvent>,
) -> Vec<RoomEventKind> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Some(room_event) = manager.handle_engine_event(event) {
            out.push(room_event.kind);
        }
    }
    out
}

#[test]
fn test_consecutive_calls_reinitialize_engine() {
    let _ = env_logger::builder().is_test(true).try_init();

    let fake = FakeMediaEngine::new();
    fake.auto_complete_joins(Ok(()));
    let (tx, mut rx) = engine_event_channel();
    let mut manager = RoomSessionManager::new(MediaEngineHandle::new(fake.clone()), tx);

    for (call, peer) in [("call_1_alice", "bob"), ("call_2_alice", "carol")] {
        manager.init("app").unwrap();
        manager
            .join(CallId::new(call), call, "alice", "001token")
            .unwrap();
        fake.remote_join(call, peer);

        assert_eq!(
            drain(&mut manager, &mut rx),
            vec![
                RoomEventKind::LocalJoinSuccess,
                RoomEventKind::RemoteJoined(peer.to_string()),
            ]
        );

        fake.remote_leave(call, peer);
        assert_eq!(
            drain(&mut manager, &mut rx),
            vec![RoomEventKind::RemoteLeft(peer.to_string())]
        );

        manager.leave();
        assert_eq!(manager.state(), RoomState::Uninitialized);
        assert!(!fake.is_created());
    }

    assert_eq!(fake.count(|c| matches!(c, EngineCall::Create(_))), 2);
    assert_eq!(fake.count(|c| *c == EngineCall::LeaveRoom), 2);
    assert_eq!(fake.count(|c| *c == EngineCall::Destroy), 2);
}

#[test]
fn test_engine_error_while_joined_is_forwarded() {
    let fake = FakeMediaEngine::new();
    fake.auto_complete_joins(Ok(()));
    let (tx, mut rx) = engine_event_channel();
    let mut manager = RoomSessionManager::new(MediaEngineHandle::new(fake.clone()), tx);

    manager.init("app").unwrap();
    manager
        .join(CallId::new("r"), "r", "alice", "001token")
        .unwrap();
    drain(&mut manager, &mut rx);

    // Codes that would fail a join are plain errors once in the room.
    fake.emit(EngineEvent::Error { code: -4 });
    assert_eq!(
        drain(&mut manager, &mut rx),
        vec![RoomEventKind::EngineError(-4)]
    );
    assert!(manager.is_joined());
}
