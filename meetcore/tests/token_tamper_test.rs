use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use meetcore::token::{AccessToken, PrivilegeGrant, TOKEN_VERSION, TokenError};

const APP_KEY: &[u8] = b"volc-test-app-key";
const T0: u64 = 1_700_000_000;

fn issue() -> AccessToken {
    AccessToken::issue_at(
        "app-under-test",
        APP_KEY,
        "call_1700000000000_u1",
        "u2",
        Duration::from_secs(3600),
        &PrivilegeGrant::call_participant(Duration::from_secs(3600)),
        T0,
    )
    .unwrap()
}

/// Flipping any single byte of the token body must never verify.
#[test]
fn test_single_byte_mutation_never_verifies() {
    let token = issue();
    let serialized = token.serialize();
    let body = URL_SAFE_NO_PAD
        .decode(serialized.strip_prefix(TOKEN_VERSION).unwrap())
        .unwrap();

    let mut parsed_mutations = 0;
    for i in 0..body.len() {
        let mut mutated = body.clone();
        mutated[i] ^= 0x01;
        let raw = format!("{TOKEN_VERSION}{}", URL_SAFE_NO_PAD.encode(&mutated));

        let Ok(candidate) = AccessToken::parse(&raw) else {
            continue;
        };
        parsed_mutations += 1;

        let result = candidate.verify(APP_KEY, T0);
        assert!(result.is_err(), "mutation at byte {i} verified");
        if candidate.expires_at() >= T0 {
            assert_eq!(
                result,
                Err(TokenError::InvalidSignature),
                "mutation at byte {i}"
            );
        }
    }

    // Most positions land in fixed-width fields or the signature and parse fine.
    assert!(parsed_mutations > body.len() / 2);
}

#[test]
fn test_past_expiry_reports_expired_for_authentic_and_forged() {
    let stale = AccessToken::issue_at(
        "app-under-test",
        APP_KEY,
        "r1",
        "u1",
        Duration::from_secs(60),
        &PrivilegeGrant::call_participant(Duration::from_secs(60)),
        T0 - 7200,
    )
    .unwrap();

    assert!(matches!(
        stale.verify(APP_KEY, T0),
        Err(TokenError::Expired { .. })
    ));
    assert!(matches!(
        stale.verify(b"forged", T0),
        Err(TokenError::Expired { .. })
    ));
}

#[test]
fn test_round_trip_through_string_is_lossless() {
    let token = issue();
    let again = AccessToken::parse(&token.serialize()).unwrap();
    assert_eq!(again, token);
    assert_eq!(again.serialize(), token.serialize());
    assert_eq!(again.signature_hex(), token.signature_hex());
}

fn split_body(body: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let msg_len = u16::from_le_bytes([body[0], body[1]]) as usize;
    let message = body[2..2 + msg_len].to_vec();
    let signature = body[4 + msg_len..].to_vec();
    (message, signature)
}

fn join_body(message: &[u8], signature: &[u8]) -> String {
    let mut body = Vec::new();
    body.extend_from_slice(&(message.len() as u16).to_le_bytes());
    body.extend_from_slice(message);
    body.extend_from_slice(&(signature.len() as u16).to_le_bytes());
    body.extend_from_slice(signature);
    format!("{TOKEN_VERSION}{}", URL_SAFE_NO_PAD.encode(body))
}

/// The same fields in another privilege order are a different message, so a
/// reordered token must not parse into something that verifies.
#[test]
fn test_reordered_privileges_are_rejected() {
    let token = issue();
    let serialized = token.serialize();
    let body = URL_SAFE_NO_PAD
        .decode(serialized.strip_prefix(TOKEN_VERSION).unwrap())
        .unwrap();
    let (message, signature) = split_body(&body);
    assert_eq!(join_body(&message, &signature), serialized);

    let split = message.len() - 20;
    let mut reordered = message[..split].to_vec();
    reordered.extend_from_slice(&message[split + 10..]);
    reordered.extend_from_slice(&message[split..split + 10]);
    let forged = join_body(&reordered, &signature);
    assert_ne!(forged, serialized);

    match AccessToken::parse(&forged) {
        Err(TokenError::Malformed(_)) => {}
        other => panic!("reordered token accepted: {other:?}"),
    }
}

#[test]
fn test_oversized_issue_fails_instead_of_truncating() {
    let long = "x".repeat(40_000);
    let result = AccessToken::issue_at(
        &long,
        APP_KEY,
        &long,
        "u2",
        Duration::from_secs(3600),
        &PrivilegeGrant::call_participant(Duration::from_secs(3600)),
        T0,
    );
    assert!(matches!(
        result,
        Err(TokenError::TooLarge {
            field: "message",
            ..
        })
    ));
}
