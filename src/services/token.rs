// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access/refresh token issuance, validation, revocation and rotation.
//!
//! Access tokens are stateless HS256 JWTs. Refresh tokens are opaque random
//! strings; only their SHA-256 digest is stored, together with the subject,
//! expiry and lifecycle state. Every state change goes through the store's
//! compare-and-transition, so a refresh token is consumed at most once.

use crate::config::Config;
use crate::db::RefreshTokenStore;
use crate::error::AppError;
use crate::models::{RefreshTokenRecord, RefreshTokenState, TokenPair, Transition};
use crate::time_utils::unix_now;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Raw refresh token length before encoding.
const REFRESH_TOKEN_BYTES: usize = 32;

/// JWT claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token ID
    pub jti: String,
}

/// Generate a random opaque refresh token (32 bytes, base64url, no padding).
pub fn generate_refresh_token(rng: &SystemRandom) -> Result<String, AppError> {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 of a raw refresh token, hex-encoded. This is the store key.
pub fn hash_refresh_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// `ttl_secs` as a signed offset that can be added to `now` without overflow.
fn checked_ttl(now: i64, ttl_secs: u64) -> Result<i64, AppError> {
    i64::try_from(ttl_secs)
        .ok()
        .filter(|ttl| now.checked_add(*ttl).is_some())
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Token TTL {} out of range", ttl_secs)))
}

/// Owner of the refresh token store and all JWT logic.
#[derive(Clone)]
pub struct TokenService<R: RefreshTokenStore> {
    store: R,
    rng: SystemRandom,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl<R: RefreshTokenStore> TokenService<R> {
    pub fn new(store: R, config: &Config) -> Self {
        Self {
            store,
            rng: SystemRandom::new(),
            encoding_key: EncodingKey::from_secret(&config.jwt_signing_key),
            decoding_key: DecodingKey::from_secret(&config.jwt_signing_key),
            issuer: config.jwt_issuer.clone(),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_secs: config.refresh_token_ttl_secs,
        }
    }

    /// Sign an access token for `subject`, valid from `now`.
    pub fn sign_access_token(&self, subject: Uuid, now: i64) -> Result<String, AppError> {
        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + checked_ttl(now, self.access_ttl_secs)?,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))
    }

    /// Verify signature, expiry and issuer of an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iss"]);
        validation.leeway = 0;

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidToken)
    }

    /// Subject of a verified access token.
    pub fn access_token_subject(&self, token: &str) -> Result<Uuid, AppError> {
        let claims = self.verify_access_token(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)
    }

    fn new_refresh_record(
        &self,
        subject: Uuid,
        now: i64,
    ) -> Result<(String, RefreshTokenRecord), AppError> {
        let raw = generate_refresh_token(&self.rng)?;
        let record = RefreshTokenRecord::issued(
            hash_refresh_token(&raw),
            subject,
            now,
            checked_ttl(now, self.refresh_ttl_secs)?,
        );
        Ok((raw, record))
    }

    fn pair(&self, subject: Uuid, refresh_token: String, now: i64) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            user_id: subject,
            access_token: self.sign_access_token(subject, now)?,
            refresh_token,
            access_token_expires_in: self.access_ttl_secs,
            refresh_token_expires_in: self.refresh_ttl_secs,
        })
    }

    /// Issue a fresh pair and record the refresh token as `Issued`.
    pub async fn issue_token_pair(&self, subject: Uuid) -> Result<TokenPair, AppError> {
        let now = unix_now();
        let (raw, record) = self.new_refresh_record(subject, now)?;
        let pair = self.pair(subject, raw, now)?;

        self.store.insert(&record).await?;

        tracing::debug!(user_id = %subject, "Token pair issued");
        Ok(pair)
    }

    /// Revoke a refresh token (sign-out).
    ///
    /// Fails with `InvalidToken` if the token is unknown or already terminal.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), AppError> {
        let token_id = hash_refresh_token(refresh_token);

        match self
            .store
            .transition(&token_id, RefreshTokenState::Revoked, unix_now())
            .await?
        {
            Transition::Applied(record) => {
                tracing::info!(user_id = %record.subject, "Refresh token revoked");
                Ok(())
            }
            Transition::Rejected(state) => {
                tracing::debug!(state = ?state, "Revocation of terminal refresh token");
                Err(AppError::InvalidToken)
            }
            Transition::Missing => Err(AppError::InvalidToken),
        }
    }

    /// Gate: the token exists, is `Issued` and has not expired.
    ///
    /// Runs lazy expiry first, so an elapsed token is recorded as `Expired`.
    pub async fn validate_refresh_token_existence(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshTokenRecord, AppError> {
        let token_id = hash_refresh_token(refresh_token);

        match self.store.find(&token_id, unix_now()).await? {
            Some(record) if record.state == RefreshTokenState::Issued => Ok(record),
            Some(record) => {
                tracing::warn!(
                    user_id = %record.subject,
                    state = ?record.state,
                    "Rejected unusable refresh token"
                );
                Err(AppError::InvalidToken)
            }
            None => Err(AppError::InvalidToken),
        }
    }

    /// Rotate: consume `refresh_token` and issue a new pair for its subject.
    ///
    /// The `Issued` precondition is re-checked atomically by the store; of
    /// several concurrent calls with the same token exactly one succeeds.
    pub async fn regenerate_token_set(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let current = self.validate_refresh_token_existence(refresh_token).await?;
        let subject = current.subject;

        let now = unix_now();
        let (raw, replacement) = self.new_refresh_record(subject, now)?;

        match self
            .store
            .rotate(&current.token_id, &replacement, now)
            .await?
        {
            Transition::Applied(_) => {
                tracing::info!(user_id = %subject, "Refresh token rotated");
                self.pair(subject, raw, now)
            }
            Transition::Rejected(state) => {
                if state == RefreshTokenState::Rotated {
                    tracing::warn!(user_id = %subject, "Refresh token replayed during rotation");
                }
                Err(AppError::InvalidToken)
            }
            Transition::Missing => Err(AppError::InvalidToken),
        }
    }
}
