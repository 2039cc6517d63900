//! Outbound signaling transport.

use async_trait::async_trait;
use meetcore::signaling::SignalMessage;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("signaling channel disconnected")]
    Disconnected,

    #[error("failed to deliver signal: {0}")]
    Delivery(String),
}

/// Delivers call control messages to the remote user (push or IM channel).
///
/// Sends are best effort: the coordinator logs failures and never waits on
/// them before changing state.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError>;
}
