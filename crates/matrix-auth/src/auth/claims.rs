//! Access token claim decoding.
//!
//! Tokens are JWTs issued by the API over TLS. The client never verifies
//! their signature: it only reads the payload to learn who the token belongs
//! to (`uid`) and when it stops being valid (`exp`).

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

/// Decoded token payload
pub type ClaimSet = Map<String, Value>;

/// Claim holding the subject (user) identifier
const CLAIM_SUBJECT: &str = "uid";

/// Claim holding the expiration, in seconds since the Unix epoch
const CLAIM_EXPIRATION: &str = "exp";

#[derive(Error, Debug)]
pub enum DecodeError {
    /// The token is not a well-formed JWT or its payload is not JSON.
    #[error("Malformed token: {0}")]
    SignaturePayloadMalformed(#[from] jsonwebtoken::errors::Error),

    /// The payload lacks a string `uid` or a numeric `exp`.
    #[error("Token claims incomplete: expected string \"uid\" and numeric \"exp\"")]
    ClaimsIncomplete(ClaimSet),
}

/// Identity and expiry recovered from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub subject_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    /// Time left before expiry, zero if already expired
    pub fn time_until_expiry(&self) -> std::time::Duration {
        time_until(self.expires_at)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Time from now until `instant`, zero if it has passed
pub(crate) fn time_until(instant: DateTime<Utc>) -> std::time::Duration {
    (instant - Utc::now())
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// Read the claim set of `token` without checking its signature.
pub fn decode_claims(token: &str) -> Result<ClaimSet, DecodeError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ClaimSet>(
        token,
        &DecodingKey::from_secret(b"ignored"), // Key is ignored when validation is disabled
        &validation,
    )?;
    Ok(data.claims)
}

/// Decode `token` into the subject and expiry the session needs.
pub fn decode_credentials(token: &str) -> Result<Credentials, DecodeError> {
    let claims = decode_claims(token)?;

    let subject_id = claims.get(CLAIM_SUBJECT).and_then(Value::as_str);
    let expires_at = claims
        .get(CLAIM_EXPIRATION)
        .and_then(Value::as_f64)
        .and_then(timestamp_to_datetime);

    match (subject_id, expires_at) {
        (Some(subject_id), Some(expires_at)) => Ok(Credentials {
            subject_id: subject_id.to_string(),
            expires_at,
        }),
        _ => Err(DecodeError::ClaimsIncomplete(claims)),
    }
}

fn timestamp_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Mint an HS256 token carrying `claims`, for tests.
#[cfg(test)]
pub(crate) fn mint_token(claims: Value) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"issuer-secret"),
    )
    .unwrap()
}

/// Mint a token for `uid` expiring `secs_from_now` seconds from now.
#[cfg(test)]
pub(crate) fn token_expiring_in(uid: &str, secs_from_now: i64) -> String {
    let exp = Utc::now().timestamp() + secs_from_now;
    mint_token(serde_json::json!({ "uid": uid, "exp": exp }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_credentials() {
        let exp = Utc::now().timestamp() + 3600;
        let token = mint_token(json!({"uid": "abc123", "exp": exp, "role": "admin"}));

        let creds = decode_credentials(&token).unwrap();
        assert_eq!(creds.subject_id, "abc123");
        assert_eq!(creds.expires_at.timestamp(), exp);
        assert!(!creds.is_expired());
    }

    #[test]
    fn test_signature_is_not_checked() {
        let token = token_expiring_in("abc123", 60);
        let (head, _) = token.rsplit_once('.').unwrap();
        let forged = format!("{}.c2lnbmF0dXJl", head);

        assert_eq!(decode_credentials(&forged).unwrap().subject_id, "abc123");
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let creds = decode_credentials(&token_expiring_in("abc123", -600)).unwrap();
        assert!(creds.is_expired());
        assert_eq!(creds.time_until_expiry(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_fractional_exp() {
        let token = mint_token(json!({"uid": "u", "exp": 1_900_000_000.5}));
        let creds = decode_credentials(&token).unwrap();
        assert_eq!(creds.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(creds.expires_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_missing_uid() {
        let token = mint_token(json!({"exp": 1_900_000_000}));
        match decode_credentials(&token) {
            Err(DecodeError::ClaimsIncomplete(claims)) => {
                assert_eq!(claims.get("exp"), Some(&json!(1_900_000_000)));
            }
            other => panic!("expected ClaimsIncomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_exp() {
        let token = mint_token(json!({"uid": "abc123", "exp": "tomorrow"}));
        assert!(matches!(
            decode_credentials(&token),
            Err(DecodeError::ClaimsIncomplete(_))
        ));
    }

    #[test]
    fn test_non_string_uid() {
        let token = mint_token(json!({"uid": 42, "exp": 1_900_000_000}));
        assert!(matches!(
            decode_credentials(&token),
            Err(DecodeError::ClaimsIncomplete(_))
        ));
    }

    #[test]
    fn test_malformed_tokens() {
        for token in ["", "not-a-jwt", "a.b", "a.b.c", "a.b.c.d"] {
            assert!(
                matches!(
                    decode_credentials(token),
                    Err(DecodeError::SignaturePayloadMalformed(_))
                ),
                "token {:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_decode_claims_returns_everything() {
        let token = mint_token(json!({"uid": "u", "exp": 1, "scope": ["devices"]}));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.get("scope"), Some(&json!(["devices"])));
    }
}
