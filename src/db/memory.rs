// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store backed by `DashMap`.
//!
//! Per-record atomicity comes from the shard lock held by `get_mut` and
//! the `entry` API. Nothing here survives a restart.

use crate::db::{CredentialStore, RefreshTokenStore};
use crate::error::AppError;
use crate::models::user::email_key;
use crate::models::{RefreshTokenRecord, RefreshTokenState, Transition, UserIdentity};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Uniqueness index: key -> owning user id.
type Index = DashMap<String, Uuid>;

#[derive(Default)]
struct Tables {
    users: DashMap<Uuid, UserIdentity>,
    emails: Index,
    nicknames: Index,
    linked_auths: Index,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
}

/// In-memory store. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

/// Result of claiming a uniqueness key.
enum Claim {
    /// Newly claimed by this save; release on failure.
    Fresh,
    /// Already owned by the same identity.
    Held,
    /// Owned by another identity.
    Conflict,
}

fn claim(index: &Index, key: &str, id: Uuid) -> Claim {
    match index.entry(key.to_string()) {
        Entry::Occupied(e) if *e.get() == id => Claim::Held,
        Entry::Occupied(_) => Claim::Conflict,
        Entry::Vacant(v) => {
            v.insert(id);
            Claim::Fresh
        }
    }
}

fn release(index: &Index, key: &str, id: Uuid) {
    index.remove_if(key, |_, owner| *owner == id);
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored refresh token records, in any state.
    pub fn refresh_token_count(&self) -> usize {
        self.tables.refresh_tokens.len()
    }

    fn index_lookup(&self, index: &Index, key: &str) -> Option<UserIdentity> {
        let id = index.get(key).map(|e| *e.value())?;
        self.tables.users.get(&id).map(|u| u.value().clone())
    }
}

impl CredentialStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<UserIdentity, AppError> {
        self.tables
            .users
            .get(&id)
            .map(|u| u.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn find_by_linked_auth_id(
        &self,
        linked_auth_id: &str,
    ) -> Result<Option<UserIdentity>, AppError> {
        Ok(self.index_lookup(&self.tables.linked_auths, linked_auth_id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        Ok(self.index_lookup(&self.tables.emails, &email_key(email)))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        Ok(self.tables.emails.contains_key(&email_key(email)))
    }

    async fn exists_by_nickname(&self, nickname: &str) -> Result<bool, AppError> {
        Ok(self.tables.nicknames.contains_key(nickname))
    }

    async fn save(&self, identity: &UserIdentity) -> Result<UserIdentity, AppError> {
        let id = identity.id;
        // The entry guard serializes saves of one identity until the write below.
        let row = self.tables.users.entry(id);
        let previous = match &row {
            Entry::Occupied(e) => Some(e.get().clone()),
            Entry::Vacant(_) => None,
        };

        let email = identity.email_key();
        let nickname = identity.nickname.clone();
        let linked = identity.linked_auth_id().map(str::to_string);

        let wanted: [(&Index, Option<&String>); 3] = [
            (&self.tables.emails, email.as_ref()),
            (&self.tables.nicknames, nickname.as_ref()),
            (&self.tables.linked_auths, linked.as_ref()),
        ];

        let mut fresh: Vec<(&Index, &String)> = Vec::new();
        for (slot, &(index, key)) in wanted.iter().enumerate() {
            let Some(key) = key else { continue };
            match claim(index, key, id) {
                Claim::Fresh => fresh.push((index, key)),
                Claim::Held => {}
                Claim::Conflict => {
                    for (index, key) in fresh {
                        release(index, key, id);
                    }
                    return Err(match slot {
                        0 => AppError::AlreadyExists(identity.email.clone().unwrap_or_default()),
                        1 => AppError::NicknameTaken(key.clone()),
                        _ => AppError::AlreadyExists(format!("linked auth {}", key)),
                    });
                }
            }
        }

        // Release keys the previous version held but this one no longer uses.
        if let Some(prev) = previous {
            let stale = [
                (&self.tables.emails, prev.email_key(), email),
                (&self.tables.nicknames, prev.nickname.clone(), nickname),
            ];
            for (index, old, new) in stale {
                if let Some(old) = old {
                    if Some(&old) != new.as_ref() {
                        release(index, &old, id);
                    }
                }
            }
        }

        match row {
            Entry::Occupied(mut e) => {
                e.insert(identity.clone());
            }
            Entry::Vacant(v) => {
                v.insert(identity.clone());
            }
        }
        Ok(identity.clone())
    }
}

impl RefreshTokenStore for MemoryStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        match self.tables.refresh_tokens.entry(record.token_id.clone()) {
            Entry::Occupied(_) => Err(AppError::Database(
                "Refresh token id collision".to_string(),
            )),
            Entry::Vacant(v) => {
                v.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, token_id: &str, now: i64) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self.tables.refresh_tokens.get_mut(token_id).map(|mut rec| {
            rec.expire_if_elapsed(now);
            rec.clone()
        }))
    }

    async fn transition(
        &self,
        token_id: &str,
        to: RefreshTokenState,
        now: i64,
    ) -> Result<Transition, AppError> {
        Ok(match self.tables.refresh_tokens.get_mut(token_id) {
            Some(mut rec) => rec.try_transition(to, now),
            None => Transition::Missing,
        })
    }

    async fn rotate(
        &self,
        token_id: &str,
        replacement: &RefreshTokenRecord,
        now: i64,
    ) -> Result<Transition, AppError> {
        // The shard guard must be dropped before inserting the replacement,
        // which may hash to the same shard.
        let outcome = match self.tables.refresh_tokens.get_mut(token_id) {
            Some(mut rec) => rec.try_transition(RefreshTokenState::Rotated, now),
            None => Transition::Missing,
        };

        if let Transition::Applied(_) = outcome {
            self.tables
                .refresh_tokens
                .insert(replacement.token_id.clone(), replacement.clone());
        }
        Ok(outcome)
    }
}
