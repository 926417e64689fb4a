//! Session tokens (HS256 JWT) and password-reset tokens.

use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use uuid::Uuid;

use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    /// Issue time in milliseconds, compared against `passwordChangedAt`.
    pub iat_ms: i64,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
        }
    }

    fn claims_at(&self, user_id: Uuid, now: OffsetDateTime) -> Claims {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            iat_ms: (now.unix_timestamp_nanos() / 1_000_000) as i64,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        let claims = self.claims_at(user_id, OffsetDateTime::now_utc());
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

/// Hex SHA-256 of a raw reset token; only this digest is persisted.
pub fn hash_reset_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// 32 random bytes from the OS generator, hex encoded.
pub fn generate_raw_reset_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Environment};

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&AppConfig::for_tests(Environment::Production).jwt)
    }

    #[test]
    fn issue_and_verify() {
        let keys = keys();
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_tokens_are_invalid() {
        let keys = keys();
        let mut token = keys.issue(Uuid::new_v4()).unwrap();
        token.push('x');
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Invalid);
        assert_eq!(keys.verify("not.a.jwt").unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn other_secret_or_audience_is_invalid() {
        let mut cfg = AppConfig::for_tests(Environment::Production).jwt;
        let token = JwtKeys::from_config(&cfg).issue(Uuid::new_v4()).unwrap();
        cfg.audience = "someone-else".into();
        assert_eq!(JwtKeys::from_config(&cfg).verify(&token).unwrap_err(), TokenError::Invalid);
        cfg.secret = "other-secret".into();
        assert_eq!(JwtKeys::from_config(&cfg).verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn expired_tokens_are_reported_as_expired() {
        let keys = keys();
        let past = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = keys.claims_at(Uuid::new_v4(), past);
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert_eq!(keys.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn reset_token_hash_is_deterministic_and_distinct() {
        let raw = generate_raw_reset_token();
        assert_eq!(raw.len(), 64);
        assert_eq!(hash_reset_token(&raw), hash_reset_token(&raw));
        assert_ne!(hash_reset_token(&raw), raw);
        assert_ne!(hash_reset_token(&raw), hash_reset_token(&generate_raw_reset_token()));
    }
}
