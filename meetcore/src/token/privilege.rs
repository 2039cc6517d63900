//! Capabilities carried by an access token.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A capability inside a media room.
///
/// The discriminants are the ids used on the wire. `PublishStream` is the
/// umbrella publish right; granting it also grants the three finer publish
/// kinds with the same expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PrivilegeKind {
    PublishStream = 0,
    PublishAudioStream = 1,
    PublishVideoStream = 2,
    PublishDataStream = 3,
    SubscribeStream = 4,
}

impl PrivilegeKind {
    pub const ALL: [PrivilegeKind; 5] = [
        Self::PublishStream,
        Self::PublishAudioStream,
        Self::PublishVideoStream,
        Self::PublishDataStream,
        Self::SubscribeStream,
    ];

    pub const fn wire_id(self) -> u16 {
        self as u16
    }

    pub fn from_wire_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_id() == id)
    }

    /// Kinds implied by granting `self`.
    pub(crate) fn implied(self) -> &'static [PrivilegeKind] {
        match self {
            Self::PublishStream => &[
                Self::PublishAudioStream,
                Self::PublishVideoStream,
                Self::PublishDataStream,
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for PrivilegeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PublishStream => "publish",
            Self::PublishAudioStream => "publish-audio",
            Self::PublishVideoStream => "publish-video",
            Self::PublishDataStream => "publish-data",
            Self::SubscribeStream => "subscribe",
        };
        f.write_str(s)
    }
}

/// When a granted privilege stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivilegeExpiry {
    /// Valid for as long as the token itself.
    Unbounded,
    /// Unix seconds.
    At(u64),
}

impl PrivilegeExpiry {
    /// `0` is the wire encoding of `Unbounded`.
    pub(crate) fn to_wire(self) -> u64 {
        match self {
            Self::Unbounded => 0,
            Self::At(ts) => ts,
        }
    }

    pub(crate) fn from_wire(value: u64) -> Self {
        if value == 0 {
            Self::Unbounded
        } else {
            Self::At(value)
        }
    }
}

/// A privilege requested at issue time, with an expiry relative to the
/// issue instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeGrant {
    pub kind: PrivilegeKind,
    /// `None` grants the privilege for the token's whole lifetime.
    pub valid_for: Option<Duration>,
}

impl PrivilegeGrant {
    pub fn for_duration(kind: PrivilegeKind, valid_for: Duration) -> Self {
        Self {
            kind,
            valid_for: Some(valid_for),
        }
    }

    pub fn unbounded(kind: PrivilegeKind) -> Self {
        Self {
            kind,
            valid_for: None,
        }
    }

    /// The grant set a call participant needs: publish for `ttl`, subscribe
    /// for the token's lifetime.
    pub fn call_participant(ttl: Duration) -> Vec<Self> {
        vec![
            Self::for_duration(PrivilegeKind::PublishStream, ttl),
            Self::unbounded(PrivilegeKind::SubscribeStream),
        ]
    }
}
