// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Refresh token records and issued token pairs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a refresh token.
///
/// `Issued` is the only non-terminal state; nothing ever returns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenState {
    Issued,
    Rotated,
    Revoked,
    Expired,
}

impl RefreshTokenState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RefreshTokenState::Issued)
    }
}

/// Server-side record of a refresh token, stored in `refresh_tokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// SHA-256 of the raw token, hex-encoded (also used as document ID)
    pub token_id: String,
    pub subject: Uuid,
    pub state: RefreshTokenState,
    /// Unix seconds
    pub issued_at: i64,
    /// Unix seconds; the token is unusable from this instant on
    pub expires_at: i64,
}

impl RefreshTokenRecord {
    pub fn issued(token_id: String, subject: Uuid, issued_at: i64, ttl_secs: i64) -> Self {
        Self {
            token_id,
            subject,
            state: RefreshTokenState::Issued,
            issued_at,
            expires_at: issued_at.saturating_add(ttl_secs),
        }
    }

    pub fn is_elapsed(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Lazily move an elapsed `Issued` record to `Expired`.
    /// Returns `true` if the state changed and must be persisted.
    pub fn expire_if_elapsed(&mut self, now: i64) -> bool {
        if self.state == RefreshTokenState::Issued && self.is_elapsed(now) {
            self.state = RefreshTokenState::Expired;
            true
        } else {
            false
        }
    }

    /// Compare-and-transition from `Issued`, after lazy expiry.
    pub fn try_transition(&mut self, to: RefreshTokenState, now: i64) -> Transition {
        self.expire_if_elapsed(now);
        if self.state != RefreshTokenState::Issued {
            return Transition::Rejected(self.state);
        }
        self.state = to;
        Transition::Applied(self.clone())
    }
}

/// Outcome of an atomic state change on a refresh token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The record was `Issued` and now holds the target state.
    Applied(RefreshTokenRecord),
    /// The record was already in the given terminal state.
    Rejected(RefreshTokenState),
    /// No record for that token.
    Missing,
}

/// Access + refresh token issued together.
#[derive(Clone, Serialize)]
pub struct TokenPair {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub access_token_expires_in: u64,
    /// Seconds until the refresh token expires
    pub refresh_token_expires_in: u64,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("user_id", &self.user_id)
            .field("access_token_expires_in", &self.access_token_expires_in)
            .field("refresh_token_expires_in", &self.refresh_token_expires_in)
            .finish_non_exhaustive()
    }
}
