//! Room access tokens.
//!
//! A token grants one user a set of privileges inside one media room until
//! it expires. The serialized form is
//!
//! ```text
//! "001" || base64url( u16 len || message || u16 len || HMAC-SHA256(app_key, message) )
//! ```
//!
//! where `message` is the canonical packing described in [`codec`].
//! Parsing never trusts the signature; callers must run [`AccessToken::verify`],
//! which checks the MAC over the message bytes exactly as received.

mod codec;
mod privilege;

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::debug;
use sha2::Sha256;
use thiserror::Error;

pub use privilege::{PrivilegeExpiry, PrivilegeGrant, PrivilegeKind};

use codec::TokenMessage;

/// Version prefix of the serialized form.
pub const TOKEN_VERSION: &str = "001";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature does not match")]
    InvalidSignature,

    #[error("token expired at {expired_at} (now {now})")]
    Expired { expired_at: u64, now: u64 },

    #[error("token ttl must be at least one second")]
    InvalidTtl,

    #[error("token must carry at least one privilege")]
    NoPrivileges,

    #[error("app key must not be empty")]
    InvalidKey,

    #[error("unsupported token version")]
    UnsupportedVersion,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("{field} is {len} bytes, over the u16 length prefix")]
    TooLarge { field: &'static str, len: usize },
}

/// A signed room credential.
///
/// Fields are read-only; a token is built by [`AccessToken::issue`] or
/// [`AccessToken::parse`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    app_id: String,
    nonce: u32,
    room_id: String,
    user_id: String,
    issued_at: u64,
    expires_at: u64,
    privileges: BTreeMap<PrivilegeKind, PrivilegeExpiry>,
    /// The signed bytes, as encoded at issue or as received by `parse`.
    message: Vec<u8>,
    signature: Vec<u8>,
    serialized: String,
}

impl AccessToken {
    /// Issue a token valid from now for `ttl`.
    pub fn issue(
        app_id: &str,
        app_key: &[u8],
        room_id: &str,
        user_id: &str,
        ttl: Duration,
        grants: &[PrivilegeGrant],
    ) -> Result<Self, TokenError> {
        Self::issue_at(
            app_id,
            app_key,
            room_id,
            user_id,
            ttl,
            grants,
            unix_now(),
        )
    }

    /// Issue a token with an explicit issue instant (unix seconds).
    pub fn issue_at(
        app_id: &str,
        app_key: &[u8],
        room_id: &str,
        user_id: &str,
        ttl: Duration,
        grants: &[PrivilegeGrant],
        issued_at: u64,
    ) -> Result<Self, TokenError> {
        let ttl_secs = ttl.as_secs();
        if ttl_secs == 0 {
            return Err(TokenError::InvalidTtl);
        }
        if grants.is_empty() {
            return Err(TokenError::NoPrivileges);
        }
        if app_key.is_empty() {
            return Err(TokenError::InvalidKey);
        }

        let expires_at = issued_at
            .checked_add(ttl_secs)
            .ok_or(TokenError::InvalidTtl)?;

        let mut privileges = BTreeMap::new();
        for grant in grants {
            let expiry = match grant.valid_for {
                None => PrivilegeExpiry::Unbounded,
                Some(d) => {
                    let at = issued_at.saturating_add(d.as_secs()).min(expires_at);
                    PrivilegeExpiry::At(at)
                }
            };
            privileges.insert(grant.kind, expiry);
        }
        for grant in grants {
            let expiry = privileges[&grant.kind];
            for implied in grant.kind.implied() {
                privileges.entry(*implied).or_insert(expiry);
            }
        }

        let nonce = rand::random();
        let message = codec::encode_message(&TokenMessage {
            app_id,
            nonce,
            issued_at,
            expires_at,
            room_id,
            user_id,
            privileges: &privileges,
        })?;
        let signature = sign(app_key, &message)?;
        let serialized = frame(&message, &signature)?;

        Ok(Self {
            app_id: app_id.to_string(),
            nonce,
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            issued_at,
            expires_at,
            privileges,
            message,
            signature,
            serialized,
        })
    }

    /// Parse a serialized token. The signature is carried but not checked.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let encoded = raw
            .strip_prefix(TOKEN_VERSION)
            .ok_or(TokenError::UnsupportedVersion)?;
        let body = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| TokenError::Malformed(format!("base64: {e}")))?;
        let (message, signature) = codec::decode_body(&body)?;
        let decoded = codec::decode_message(&message)?;
        let serialized = frame(&message, &signature)?;

        Ok(Self {
            app_id: decoded.app_id,
            nonce: decoded.nonce,
            room_id: decoded.room_id,
            user_id: decoded.user_id,
            issued_at: decoded.issued_at,
            expires_at: decoded.expires_at,
            privileges: decoded.privileges,
            message,
            signature,
            serialized,
        })
    }

    /// The string form, fixed when the token was issued or parsed.
    pub fn serialize(&self) -> String {
        self.serialized.clone()
    }

    /// Check expiry first, then the MAC.
    ///
    /// An expired token reports `Expired` whether or not it is authentic;
    /// a live token whose MAC does not match reports `InvalidSignature`.
    pub fn verify(&self, app_key: &[u8], now: u64) -> Result<(), TokenError> {
        if now > self.expires_at {
            return Err(TokenError::Expired {
                expired_at: self.expires_at,
                now,
            });
        }
        let mut mac =
            HmacSha256::new_from_slice(app_key).map_err(|_| TokenError::InvalidSignature)?;
        mac.update(&self.message);
        mac.verify_slice(&self.signature).map_err(|_| {
            debug!(
                target: "Token",
                "Signature mismatch for {} in room {}",
                self.user_id,
                self.room_id
            );
            TokenError::InvalidSignature
        })
    }

    /// Last second at which `kind` is usable, or `None` if not granted.
    pub fn effective_expiry(&self, kind: PrivilegeKind) -> Option<u64> {
        self.privileges.get(&kind).map(|expiry| match expiry {
            PrivilegeExpiry::Unbounded => self.expires_at,
            PrivilegeExpiry::At(at) => (*at).min(self.expires_at),
        })
    }

    pub fn allows(&self, kind: PrivilegeKind, now: u64) -> bool {
        self.effective_expiry(kind).is_some_and(|e| now <= e)
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn privileges(&self) -> &BTreeMap<PrivilegeKind, PrivilegeExpiry> {
        &self.privileges
    }

    pub fn signature_hex(&self) -> String {
        hex::encode(&self.signature)
    }
}

fn frame(message: &[u8], signature: &[u8]) -> Result<String, TokenError> {
    let body = codec::encode_body(message, signature)?;
    Ok(format!("{TOKEN_VERSION}{}", URL_SAFE_NO_PAD.encode(body)))
}

fn sign(app_key: &[u8], message: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut mac = HmacSha256::new_from_slice(app_key).map_err(|_| TokenError::InvalidKey)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Current wall clock in unix seconds.
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}
