//! Call signaling messages exchanged over the push/IM channel.
//!
//! Signaling only carries invite/answer/hangup intent. Media never flows
//! here. Messages are JSON objects with camelCase keys.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::call::CallId;

/// Signaling message types for call control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    /// Invite sent by the caller.
    CallRequest,
    /// Callee answered.
    CallAccept,
    /// Callee declined. May carry `reason` in `extra`.
    CallReject,
    /// Caller gave up before the callee answered.
    CallCancel,
    /// Either side hung up an established call.
    CallEnd,
    /// Ringing expired on the sender's side.
    CallTimeout,
    /// Callee is already in another call.
    CallBusy,
}

/// One signaling message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub call_id: CallId,
    pub from_user_id: String,
    pub to_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Unix milliseconds at the sender.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<HashMap<String, String>>,
}

pub const EXTRA_CALLER_NAME: &str = "callerName";
pub const EXTRA_REASON: &str = "reason";

impl SignalMessage {
    fn new(signal_type: SignalType, call_id: &CallId, from: &str, to: &str) -> Self {
        Self {
            signal_type,
            call_id: call_id.clone(),
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            room_id: None,
            timestamp: Utc::now().timestamp_millis(),
            extra: None,
        }
    }

    /// Invite. The room id is the call id.
    pub fn call_request(call_id: &CallId, from: &str, to: &str) -> Self {
        let mut msg = Self::new(SignalType::CallRequest, call_id, from, to);
        msg.room_id = Some(call_id.room_id().to_string());
        msg
    }

    pub fn call_accept(call_id: &CallId, from: &str, to: &str, room_id: &str) -> Self {
        let mut msg = Self::new(SignalType::CallAccept, call_id, from, to);
        msg.room_id = Some(room_id.to_string());
        msg
    }

    pub fn call_reject(call_id: &CallId, from: &str, to: &str, reason: Option<&str>) -> Self {
        let mut msg = Self::new(SignalType::CallReject, call_id, from, to);
        if let Some(reason) = reason {
            msg = msg.with_extra(EXTRA_REASON, reason);
        }
        msg
    }

    pub fn call_cancel(call_id: &CallId, from: &str, to: &str) -> Self {
        Self::new(SignalType::CallCancel, call_id, from, to)
    }

    pub fn call_end(call_id: &CallId, from: &str, to: &str) -> Self {
        Self::new(SignalType::CallEnd, call_id, from, to)
    }

    pub fn call_timeout(call_id: &CallId, from: &str, to: &str) -> Self {
        Self::new(SignalType::CallTimeout, call_id, from, to)
    }

    pub fn call_busy(call_id: &CallId, from: &str, to: &str) -> Self {
        Self::new(SignalType::CallBusy, call_id, from, to)
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extra
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn extra_value(&self, key: &str) -> Option<&str> {
        self.extra.as_ref()?.get(key).map(String::as_str)
    }

    /// Room to join for this call; falls back to the call id.
    pub fn room(&self) -> &str {
        self.room_id.as_deref().unwrap_or(self.call_id.room_id())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
