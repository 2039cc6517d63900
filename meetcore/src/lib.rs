//! Runtime-free core of the call stack: access tokens, the call state
//! table, signaling wire types and duration formatting.
//!
//! Nothing in this crate spawns tasks or reads from the network. The
//! `meetcall` crate drives these types from its coordination task.

pub mod call_state;
pub mod duration;
pub mod signaling;
pub mod token;
pub mod types;

pub use call_state::{CallState, CallTrigger, InvalidTransition};
pub use token::{AccessToken, PrivilegeGrant, PrivilegeKind, TokenError};
pub use types::call::{CallId, CallRole, EndReason};
