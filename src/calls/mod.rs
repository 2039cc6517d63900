//! One-to-one call lifecycle.
//!
//! # Architecture
//!
//! - [`CallCoordinator`]: cloneable handle; posts commands to the
//!   coordination task and exposes a [`CallEvent`] bus
//! - [`CallSession`]: the single live call, owned by the coordination task
//! - [`SignalingChannel`]: outbound transport for call control messages
//!
//! State changes go through [`meetcore::CallState::on`]; the coordinator only
//! decides which trigger an input maps to and what teardown follows.
//!
//! # Flow
//!
//! Idle → Ringing → Connecting (token minted, room joined) → Active (both
//! peers present, duration clock running) → Ended → Idle. Every path into
//! Ended leaves the room, notifies the peer when this side ended the call,
//! and fires the ended callback exactly once.

mod coordinator;
mod error;
mod events;
mod messages;
mod session;
mod signaling;

pub use coordinator::CallCoordinator;
pub use error::CallError;
pub use events::CallEvent;
pub use messages::{CallEndedCallback, TimeoutStage};
pub use session::CallSession;
pub use signaling::{SignalingChannel, SignalingError};
