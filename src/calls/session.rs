use chrono::{DateTime, Utc};
use meetcore::{CallId, CallRole, CallState, CallTrigger, EndReason, InvalidTransition};
use serde::Serialize;

/// The one call this device is part of.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub call_id: CallId,
    pub room_id: String,
    pub local_user_id: String,
    pub remote_user_id: String,
    pub role: CallRole,
    pub state: CallState,
    pub created_at: DateTime<Utc>,
    /// Set when the call becomes Active.
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub local_joined: bool,
    pub remote_present: bool,
    /// Caller display name from the invite.
    pub remote_display_name: Option<String>,
}

impl CallSession {
    pub fn outgoing(call_id: CallId, local_user_id: &str, remote_user_id: &str) -> Self {
        let room_id = call_id.room_id().to_string();
        Self::new(call_id, room_id, local_user_id, remote_user_id, CallRole::Caller)
    }

    pub fn incoming(
        call_id: CallId,
        room_id: &str,
        local_user_id: &str,
        remote_user_id: &str,
    ) -> Self {
        Self::new(
            call_id,
            room_id.to_string(),
            local_user_id,
            remote_user_id,
            CallRole::Callee,
        )
    }

    fn new(
        call_id: CallId,
        room_id: String,
        local_user_id: &str,
        remote_user_id: &str,
        role: CallRole,
    ) -> Self {
        Self {
            call_id,
            room_id,
            local_user_id: local_user_id.to_string(),
            remote_user_id: remote_user_id.to_string(),
            role,
            state: CallState::Idle,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            end_reason: None,
            local_joined: false,
            remote_present: false,
            remote_display_name: None,
        }
    }

    pub fn is_outgoing(&self) -> bool {
        self.role == CallRole::Caller
    }

    /// Both sides are in the media room.
    pub fn media_ready(&self) -> bool {
        self.local_joined && self.remote_present
    }

    /// Apply a trigger through the state table, keeping timestamps in step.
    pub fn apply(&mut self, trigger: CallTrigger) -> Result<CallState, InvalidTransition> {
        let next = self.state.on(trigger)?;
        match next {
            CallState::Active => self.connected_at = Some(Utc::now()),
            CallState::Ended => self.ended_at = Some(Utc::now()),
            _ => {}
        }
        self.state = next;
        Ok(next)
    }

    /// Wall-clock seconds spent Active, if the call ever connected.
    pub fn talk_secs(&self) -> u64 {
        match self.connected_at {
            Some(connected) => {
                let end = self.ended_at.unwrap_or_else(Utc::now);
                (end - connected).num_seconds().max(0) as u64
            }
            None => 0,
        }
    }
}
