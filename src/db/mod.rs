// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: credential and refresh token stores.
//!
//! Both stores are the only shared mutable state in the service. Two
//! backends implement them: [`MemoryStore`] for local development and
//! tests, and [`FirestoreDb`] for production.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{RefreshTokenRecord, RefreshTokenState, Transition, UserIdentity};
use std::future::Future;
use uuid::Uuid;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Email uniqueness index, keyed by normalized email
    pub const USER_EMAILS: &str = "user_emails";
    /// Nickname uniqueness index, keyed by nickname
    pub const USER_NICKNAMES: &str = "user_nicknames";
    /// Linked auth id index for federated identities
    pub const USER_LINKED_AUTHS: &str = "user_linked_auths";
    pub const REFRESH_TOKENS: &str = "refresh_tokens";
}

/// Persistence of user identities.
pub trait CredentialStore: Clone + Send + Sync + 'static {
    /// Fails with `NotFound` if absent.
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = Result<UserIdentity, AppError>> + Send;

    fn find_by_linked_auth_id(
        &self,
        linked_auth_id: &str,
    ) -> impl Future<Output = Result<Option<UserIdentity>, AppError>> + Send;

    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserIdentity>, AppError>> + Send;

    fn exists_by_email(&self, email: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn exists_by_nickname(
        &self,
        nickname: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Upsert. Atomically claims the email, nickname and linked auth id; a
    /// key held by another identity fails with `AlreadyExists` or
    /// `NicknameTaken`.
    fn save(
        &self,
        identity: &UserIdentity,
    ) -> impl Future<Output = Result<UserIdentity, AppError>> + Send;
}

/// Persistence of refresh token records, keyed by token id (hash).
pub trait RefreshTokenStore: Clone + Send + Sync + 'static {
    fn insert(
        &self,
        record: &RefreshTokenRecord,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Look up a record, persisting lazy expiry first.
    fn find(
        &self,
        token_id: &str,
        now: i64,
    ) -> impl Future<Output = Result<Option<RefreshTokenRecord>, AppError>> + Send;

    /// Atomic compare-and-transition from `Issued` to `to`.
    fn transition(
        &self,
        token_id: &str,
        to: RefreshTokenState,
        now: i64,
    ) -> impl Future<Output = Result<Transition, AppError>> + Send;

    /// Atomically move `token_id` from `Issued` to `Rotated` and insert
    /// `replacement`. Nothing is written unless the transition applies.
    fn rotate(
        &self,
        token_id: &str,
        replacement: &RefreshTokenRecord,
        now: i64,
    ) -> impl Future<Output = Result<Transition, AppError>> + Send;
}

/// Backend selected at startup.
#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Firestore(FirestoreDb),
}

impl Store {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Firestore(_) => "firestore",
        }
    }
}

impl CredentialStore for Store {
    async fn find_by_id(&self, id: Uuid) -> Result<UserIdentity, AppError> {
        match self {
            Store::Memory(s) => s.find_by_id(id).await,
            Store::Firestore(db) => db.find_by_id(id).await,
        }
    }

    async fn find_by_linked_auth_id(
        &self,
        linked_auth_id: &str,
    ) -> Result<Option<UserIdentity>, AppError> {
        match self {
            Store::Memory(s) => s.find_by_linked_auth_id(linked_auth_id).await,
            Store::Firestore(db) => db.find_by_linked_auth_id(linked_auth_id).await,
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        match self {
            Store::Memory(s) => s.find_by_email(email).await,
            Store::Firestore(db) => db.find_by_email(email).await,
        }
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        match self {
            Store::Memory(s) => s.exists_by_email(email).await,
            Store::Firestore(db) => db.exists_by_email(email).await,
        }
    }

    async fn exists_by_nickname(&self, nickname: &str) -> Result<bool, AppError> {
        match self {
            Store::Memory(s) => s.exists_by_nickname(nickname).await,
            Store::Firestore(db) => db.exists_by_nickname(nickname).await,
        }
    }

    async fn save(&self, identity: &UserIdentity) -> Result<UserIdentity, AppError> {
        match self {
            Store::Memory(s) => s.save(identity).await,
            Store::Firestore(db) => db.save(identity).await,
        }
    }
}

impl RefreshTokenStore for Store {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        match self {
            Store::Memory(s) => s.insert(record).await,
            Store::Firestore(db) => db.insert(record).await,
        }
    }

    async fn find(&self, token_id: &str, now: i64) -> Result<Option<RefreshTokenRecord>, AppError> {
        match self {
            Store::Memory(s) => s.find(token_id, now).await,
            Store::Firestore(db) => db.find(token_id, now).await,
        }
    }

    async fn transition(
        &self,
        token_id: &str,
        to: RefreshTokenState,
        now: i64,
    ) -> Result<Transition, AppError> {
        match self {
            Store::Memory(s) => s.transition(token_id, to, now).await,
            Store::Firestore(db) => db.transition(token_id, to, now).await,
        }
    }

    async fn rotate(
        &self,
        token_id: &str,
        replacement: &RefreshTokenRecord,
        now: i64,
    ) -> Result<Transition, AppError> {
        match self {
            Store::Memory(s) => s.rotate(token_id, replacement, now).await,
            Store::Firestore(db) => db.rotate(token_id, replacement, now).await,
        }
    }
}
