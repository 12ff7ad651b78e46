//! Stateless signed session tokens.
//!
//! A session token is a compact HS256-signed claim set
//! (`header.claims.signature`, base64url JSON) carrying the account id and an
//! expiry. There is no server-side session state: validity is entirely a
//! function of the signature and the expiry, so blocking an account is
//! enforced by the auth gate on lookup, not by revoking tokens.
//!
//! The signing key is process-wide, loaded once at startup from configuration
//! and validated before use. Rotation happens only by restart.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing key length in bytes. Anything shorter than the HMAC
/// output size weakens the construction.
const MIN_KEY_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionHeader {
    pub alg: String,
    pub typ: String,
}

impl SessionHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid subject")]
    InvalidSubject,
    #[error("rejected signing key")]
    KeyRejected,
}

/// Server-held HMAC signing key, validated at construction.
#[derive(Clone)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Build a signing key from configured secret material.
    ///
    /// # Errors
    ///
    /// Rejects keys shorter than 32 bytes and keys without byte diversity
    /// (e.g. a single repeated character), both signs of placeholder values.
    pub fn from_secret(secret: &SecretString) -> Result<Self, Error> {
        let bytes = secret.expose_secret().trim().as_bytes().to_vec();
        if bytes.len() < MIN_KEY_BYTES {
            return Err(Error::KeyRejected);
        }
        let first = bytes[0];
        if bytes.iter().all(|byte| *byte == first) {
            return Err(Error::KeyRejected);
        }
        Ok(Self(bytes))
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(&self.0).map_err(|_| Error::KeyRejected)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Mint an HS256-signed session token for `account_id`.
///
/// # Errors
///
/// Returns an error if claim encoding or MAC construction fails.
pub fn mint(
    key: &SessionKey,
    account_id: Uuid,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> Result<String, Error> {
    let claims = SessionClaims {
        sub: account_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
    };

    let header_b64 = b64e_json(&SessionHeader::hs256())?;
    let claims_b64 = b64e_json(&claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let mut mac = key.mac()?;
    mac.update(signing_input.as_bytes());
    let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Verify a session token and return the account id it was minted for.
///
/// # Errors
///
/// Any malformed encoding, signature mismatch, or expiry yields an error.
/// Callers must collapse all variants into one uniform rejection toward the
/// requester; the variants exist for internal logging only.
pub fn validate(key: &SessionKey, token: &str, now: DateTime<Utc>) -> Result<Uuid, Error> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
    let sig_b64 = parts.next().ok_or(Error::TokenFormat)?;
    if parts.next().is_some() {
        return Err(Error::TokenFormat);
    }

    let header: SessionHeader = b64d_json(header_b64)?;
    if header.alg != "HS256" {
        return Err(Error::UnsupportedAlg(header.alg));
    }

    let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Error::Base64)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    let mut mac = key.mac()?;
    mac.update(signing_input.as_bytes());
    // Constant-time comparison happens inside verify_slice.
    mac.verify_slice(&signature)
        .map_err(|_| Error::InvalidSignature)?;

    let claims: SessionClaims = b64d_json(claims_b64)?;
    if claims.exp <= now.timestamp() {
        return Err(Error::Expired);
    }

    Uuid::parse_str(&claims.sub).map_err(|_| Error::InvalidSubject)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW, 0).unwrap()
    }

    fn key() -> SessionKey {
        SessionKey::from_secret(&SecretString::from(
            "an-adequately-long-signing-secret-0123456789",
        ))
        .unwrap()
    }

    #[test]
    fn mint_and_validate_round_trips() -> Result<(), Error> {
        let account_id = Uuid::new_v4();
        let token = mint(&key(), account_id, 600, now())?;
        let validated = validate(&key(), &token, now() + Duration::seconds(599))?;
        assert_eq!(validated, account_id);
        Ok(())
    }

    #[test]
    fn rejects_after_expiry() -> Result<(), Error> {
        let token = mint(&key(), Uuid::new_v4(), 600, now())?;
        let result = validate(&key(), &token, now() + Duration::seconds(600));
        assert!(matches!(result, Err(Error::Expired)));
        Ok(())
    }

    #[test]
    fn rejects_tampered_claims() -> Result<(), Error> {
        let token = mint(&key(), Uuid::new_v4(), 600, now())?;
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_claims = b64e_json(&SessionClaims {
            sub: Uuid::new_v4().to_string(),
            iat: NOW,
            exp: NOW + 600,
        })?;
        parts[1] = &forged_claims;
        let forged = parts.join(".");
        let result = validate(&key(), &forged, now());
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_wrong_key() -> Result<(), Error> {
        let other_key = SessionKey::from_secret(&SecretString::from(
            "a-different-equally-long-signing-secret-42",
        ))
        .unwrap();
        let token = mint(&key(), Uuid::new_v4(), 600, now())?;
        let result = validate(&other_key, &token, now());
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(
            validate(&key(), "not-a-token", now()),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            validate(&key(), "a.b.c.d", now()),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            validate(&key(), "!!.!!.!!", now()),
            Err(Error::Base64)
        ));
    }

    #[test]
    fn key_rejects_short_or_uniform_secrets() {
        assert!(matches!(
            SessionKey::from_secret(&SecretString::from("short")),
            Err(Error::KeyRejected)
        ));
        assert!(matches!(
            SessionKey::from_secret(&SecretString::from(
                "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
            )),
            Err(Error::KeyRejected)
        ));
        assert!(SessionKey::from_secret(&SecretString::from(
            "0123456789abcdef0123456789abcdef"
        ))
        .is_ok());
    }
}
