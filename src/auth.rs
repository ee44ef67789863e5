//! Presenter JWT handling and participant opaque-token hashing.
//!
//! Presenter identity is an already-issued JWT's `sub` claim (credential
//! issuance is out of scope); participant identity is a random bearer
//! token handed out at join time and stored only as a SHA-256 hash, the
//! same shape as the teacher's device-token lookup.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, DecodingKey, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterClaims {
    pub sub: String,
    pub exp: usize,
}

pub fn verify_presenter_token(token: &str, secret: &str) -> Option<PresenterClaims> {
    decode::<PresenterClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

/// Generates a fresh opaque participant token. Returned once to the caller;
/// only its hash is persisted.
pub fn generate_participant_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_token(raw_token: &str) -> String {
    let digest = Sha256::digest(raw_token.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(sub: &str, secret: &str, exp: usize) -> String {
        encode(
            &Header::default(),
            &PresenterClaims {
                sub: sub.to_owned(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verify_presenter_token_round_trips_a_matching_secret() {
        let token = sign("presenter-1", "topsecret", 9_999_999_999);
        let claims = verify_presenter_token(&token, "topsecret").expect("valid token");
        assert_eq!(claims.sub, "presenter-1");
    }

    #[test]
    fn verify_presenter_token_rejects_wrong_secret() {
        let token = sign("presenter-1", "topsecret", 9_999_999_999);
        assert!(verify_presenter_token(&token, "wrongsecret").is_none());
    }

    #[test]
    fn verify_presenter_token_rejects_expired_token() {
        let token = sign("presenter-1", "topsecret", 1);
        assert!(verify_presenter_token(&token, "topsecret").is_none());
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("abc123"), None);
    }

    #[test]
    fn hash_token_is_deterministic_and_not_the_raw_value() {
        let token = generate_participant_token();
        let h1 = hash_token(&token);
        let h2 = hash_token(&token);
        assert_eq!(h1, h2);
        assert_ne!(h1, token);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn generate_participant_token_is_not_trivially_guessable() {
        let a = generate_participant_token();
        let b = generate_participant_token();
        assert_ne!(a, b);
    }
}
