//! Canonical binary packing of token fields.
//!
//! Integers are little-endian. Strings and byte blobs carry a u16 length
//! prefix. Privileges are written as a u16 count followed by
//! `(u16 kind, u64 expiry)` pairs in strictly ascending kind order, which is
//! what makes the message canonical. The decoder rejects any other order.
//! The whole message must itself fit the u16 prefix of the token body.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut};

use super::TokenError;
use super::privilege::{PrivilegeExpiry, PrivilegeKind};

/// The signed part of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TokenMessage<'a> {
    pub app_id: &'a str,
    pub nonce: u32,
    pub issued_at: u64,
    pub expires_at: u64,
    pub room_id: &'a str,
    pub user_id: &'a str,
    pub privileges: &'a BTreeMap<PrivilegeKind, PrivilegeExpiry>,
}

pub(crate) fn encode_message(msg: &TokenMessage<'_>) -> Result<Vec<u8>, TokenError> {
    let mut buf = Vec::with_capacity(
        64 + msg.app_id.len() + msg.room_id.len() + msg.user_id.len() + msg.privileges.len() * 10,
    );
    put_str(&mut buf, msg.app_id, "app id")?;
    buf.put_u32_le(msg.nonce);
    buf.put_u64_le(msg.issued_at);
    buf.put_u64_le(msg.expires_at);
    put_str(&mut buf, msg.room_id, "room id")?;
    put_str(&mut buf, msg.user_id, "user id")?;
    buf.put_u16_le(prefix_len(msg.privileges.len(), "privileges")?);
    for (kind, expiry) in msg.privileges {
        buf.put_u16_le(kind.wire_id());
        buf.put_u64_le(expiry.to_wire());
    }
    prefix_len(buf.len(), "message")?;
    Ok(buf)
}

/// Owned counterpart of [`TokenMessage`] produced by decoding.
#[derive(Debug)]
pub(crate) struct DecodedMessage {
    pub app_id: String,
    pub nonce: u32,
    pub issued_at: u64,
    pub expires_at: u64,
    pub room_id: String,
    pub user_id: String,
    pub privileges: BTreeMap<PrivilegeKind, PrivilegeExpiry>,
}

pub(crate) fn decode_message(mut data: &[u8]) -> Result<DecodedMessage, TokenError> {
    let app_id = get_str(&mut data, "app id")?;
    let nonce = get_u32(&mut data, "nonce")?;
    let issued_at = get_u64(&mut data, "issued at")?;
    let expires_at = get_u64(&mut data, "expires at")?;
    let room_id = get_str(&mut data, "room id")?;
    let user_id = get_str(&mut data, "user id")?;

    let count = get_u16(&mut data, "privilege count")?;
    let mut privileges = BTreeMap::new();
    let mut previous: Option<PrivilegeKind> = None;
    for _ in 0..count {
        let id = get_u16(&mut data, "privilege kind")?;
        let kind = PrivilegeKind::from_wire_id(id)
            .ok_or_else(|| TokenError::Malformed(format!("unknown privilege kind {id}")))?;
        if previous.is_some_and(|prev| kind <= prev) {
            return Err(TokenError::Malformed(format!("privilege {kind} out of order")));
        }
        previous = Some(kind);
        let expiry = PrivilegeExpiry::from_wire(get_u64(&mut data, "privilege expiry")?);
        privileges.insert(kind, expiry);
    }

    if data.has_remaining() {
        return Err(TokenError::Malformed(format!(
            "{} trailing bytes after message",
            data.remaining()
        )));
    }

    Ok(DecodedMessage {
        app_id,
        nonce,
        issued_at,
        expires_at,
        room_id,
        user_id,
        privileges,
    })
}

/// Frame the message and signature into the token body.
pub(crate) fn encode_body(message: &[u8], signature: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut buf = Vec::with_capacity(4 + message.len() + signature.len());
    put_bytes(&mut buf, message, "message")?;
    put_bytes(&mut buf, signature, "signature")?;
    Ok(buf)
}

pub(crate) fn decode_body(mut data: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TokenError> {
    let message = get_bytes(&mut data, "message")?;
    let signature = get_bytes(&mut data, "signature")?;
    if data.has_remaining() {
        return Err(TokenError::Malformed(format!(
            "{} trailing bytes after signature",
            data.remaining()
        )));
    }
    Ok((message, signature))
}

fn prefix_len(len: usize, field: &'static str) -> Result<u16, TokenError> {
    u16::try_from(len).map_err(|_| TokenError::TooLarge { field, len })
}

fn put_str(buf: &mut Vec<u8>, s: &str, field: &'static str) -> Result<(), TokenError> {
    put_bytes(buf, s.as_bytes(), field)
}

fn put_bytes(buf: &mut Vec<u8>, b: &[u8], field: &'static str) -> Result<(), TokenError> {
    buf.put_u16_le(prefix_len(b.len(), field)?);
    buf.put_slice(b);
    Ok(())
}

fn ensure(data: &[u8], needed: usize, field: &str) -> Result<(), TokenError> {
    if data.remaining() < needed {
        return Err(TokenError::Malformed(format!(
            "truncated {field}: need {needed} bytes, have {}",
            data.remaining()
        )));
    }
    Ok(())
}

fn get_u16(data: &mut &[u8], field: &str) -> Result<u16, TokenError> {
    ensure(data, 2, field)?;
    Ok(data.get_u16_le())
}

fn get_u32(data: &mut &[u8], field: &str) -> Result<u32, TokenError> {
    ensure(data, 4, field)?;
    Ok(data.get_u32_le())
}

fn get_u64(data: &mut &[u8], field: &str) -> Result<u64, TokenError> {
    ensure(data, 8, field)?;
    Ok(data.get_u64_le())
}

fn get_bytes(data: &mut &[u8], field: &str) -> Result<Vec<u8>, TokenError> {
    let len = get_u16(data, field)? as usize;
    ensure(data, len, field)?;
    let out = data[..len].to_vec();
    data.advance(len);
    Ok(out)
}

fn get_str(data: &mut &[u8], field: &str) -> Result<String, TokenError> {
    let raw = get_bytes(data, field)?;
    String::from_utf8(raw).map_err(|_| TokenError::Malformed(format!("{field} is not utf-8")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_privileges() -> BTreeMap<PrivilegeKind, PrivilegeExpiry> {
        let mut p = BTreeMap::new();
        p.insert(PrivilegeKind::SubscribeStream, PrivilegeExpiry::Unbounded);
        p.insert(PrivilegeKind::PublishStream, PrivilegeExpiry::At(1_700_003_600));
        p
    }

    #[test]
    fn test_message_layout_is_little_endian_and_ordered() {
        let privileges = sample_privileges();
        let msg = TokenMessage {
            app_id: "a",
            nonce: 1,
            issued_at: 2,
            expires_at: 3,
            room_id: "r",
            user_id: "u",
            privileges: &privileges,
        };
        let bytes = encode_message(&msg).unwrap();

        assert_eq!(&bytes[..3], &[1, 0, b'a']);
        assert_eq!(&bytes[3..7], &1u32.to_le_bytes());
        // Publish (0) sorts before subscribe (4) regardless of insert order.
        let tail = &bytes[bytes.len() - 22..];
        assert_eq!(&tail[..2], &2u16.to_le_bytes());
        assert_eq!(&tail[2..4], &0u16.to_le_bytes());
        assert_eq!(&tail[12..14], &4u16.to_le_bytes());
        assert_eq!(&tail[14..], &0u64.to_le_bytes());
    }

    #[test]
    fn test_decode_rejects_truncated_message() {
        let privileges = sample_privileges();
        let msg = TokenMessage {
            app_id: "app",
            nonce: 9,
            issued_at: 10,
            expires_at: 20,
            room_id: "room",
            user_id: "user",
            privileges: &privileges,
        };
        let bytes = encode_message(&msg).unwrap();
        for cut in [0, 1, 5, bytes.len() - 1] {
            assert!(matches!(
                decode_message(&bytes[..cut]),
                Err(TokenError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut body = encode_body(b"msg", b"sig").unwrap();
        body.push(0);
        assert!(matches!(decode_body(&body), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_unordered_or_repeated_privileges() {
        let privileges = sample_privileges();
        let msg = TokenMessage {
            app_id: "a",
            nonce: 1,
            issued_at: 2,
            expires_at: 3,
            room_id: "r",
            user_id: "u",
            privileges: &privileges,
        };
        let bytes = encode_message(&msg).unwrap();
        assert!(decode_message(&bytes).is_ok());

        // Swap the two 10-byte (kind, expiry) entries at the tail.
        let split = bytes.len() - 20;
        let mut swapped = bytes[..split].to_vec();
        swapped.extend_from_slice(&bytes[split + 10..]);
        swapped.extend_from_slice(&bytes[split..split + 10]);
        assert!(matches!(
            decode_message(&swapped),
            Err(TokenError::Malformed(_))
        ));

        let mut repeated = bytes[..split].to_vec();
        repeated.extend_from_slice(&bytes[split..split + 10]);
        repeated.extend_from_slice(&bytes[split..split + 10]);
        assert!(matches!(
            decode_message(&repeated),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_fields() {
        let privileges = sample_privileges();
        let long = "x".repeat(u16::MAX as usize + 1);
        let msg = TokenMessage {
            app_id: &long,
            nonce: 1,
            issued_at: 2,
            expires_at: 3,
            room_id: "r",
            user_id: "u",
            privileges: &privileges,
        };
        assert_eq!(
            encode_message(&msg),
            Err(TokenError::TooLarge {
                field: "app id",
                len: u16::MAX as usize + 1
            })
        );

        // Each string fits on its own but the message does not.
        let half = "y".repeat(40_000);
        let msg = TokenMessage {
            app_id: &half,
            room_id: &half,
            ..msg
        };
        assert!(matches!(
            encode_message(&msg),
            Err(TokenError::TooLarge {
                field: "message",
                ..
            })
        ));
    }
}
