// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (identity records plus email/nickname/linked-auth indexes)
//! - Refresh tokens (records keyed by token hash)
//!
//! Every write that must be atomic (uniqueness claims, token state
//! changes) runs in a transaction whose reads use the transaction's
//! consistency selector, so a concurrent writer aborts the commit.

use crate::db::{collections, CredentialStore, RefreshTokenStore};
use crate::error::AppError;
use crate::models::user::email_key;
use crate::models::{RefreshTokenRecord, RefreshTokenState, Transition, UserIdentity};
use firestore::FirestoreConsistencySelector;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document in one of the uniqueness index collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    user_id: Uuid,
}

/// Index document IDs are hex so that arbitrary keys (emails with `/`,
/// provider ids) are valid Firestore IDs.
fn index_doc_id(key: &str) -> String {
    hex::encode(key.as_bytes())
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Helper Methods ────────────────────────────────────────────

    async fn read_doc<T>(
        client: &firestore::FirestoreDb,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send + Sync,
    {
        client
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn write_doc<T>(&self, collection: &str, doc_id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn lookup_index(&self, collection: &str, key: &str) -> Result<Option<Uuid>, AppError> {
        let entry: Option<IndexEntry> =
            Self::read_doc(self.get_client()?, collection, &index_doc_id(key)).await?;
        Ok(entry.map(|e| e.user_id))
    }

    async fn find_via_index(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<UserIdentity>, AppError> {
        let Some(user_id) = self.lookup_index(collection, key).await? else {
            return Ok(None);
        };
        Self::read_doc(self.get_client()?, collections::USERS, &user_id.to_string()).await
    }

    /// Transactional compare-and-transition on a refresh token record,
    /// optionally inserting a replacement record in the same commit.
    async fn transition_in_transaction(
        &self,
        token_id: &str,
        to: RefreshTokenState,
        now: i64,
        replacement: Option<&RefreshTokenRecord>,
    ) -> Result<Transition, AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Reads through this handle register the document for conflict detection
        let tx_db = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );

        let current: Option<RefreshTokenRecord> =
            Self::read_doc(&tx_db, collections::REFRESH_TOKENS, token_id).await?;

        let Some(mut record) = current else {
            let _ = transaction.rollback().await;
            return Ok(Transition::Missing);
        };

        let before = record.state;
        let outcome = record.try_transition(to, now);
        if record.state == before {
            let _ = transaction.rollback().await;
            return Ok(outcome);
        }

        client
            .fluent()
            .update()
            .in_col(collections::REFRESH_TOKENS)
            .document_id(token_id)
            .object(&record)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add token to transaction: {}", e))
            })?;

        if let (Transition::Applied(_), Some(replacement)) = (&outcome, replacement) {
            client
                .fluent()
                .update()
                .in_col(collections::REFRESH_TOKENS)
                .document_id(&replacement.token_id)
                .object(replacement)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!(
                        "Failed to add replacement token to transaction: {}",
                        e
                    ))
                })?;
        }

        match transaction.commit().await {
            Ok(_) => Ok(outcome),
            Err(e) => {
                // A concurrent writer won. Report the state it left behind.
                let winner: Option<RefreshTokenRecord> =
                    Self::read_doc(client, collections::REFRESH_TOKENS, token_id).await?;
                match winner {
                    Some(rec) if rec.state.is_terminal() => {
                        tracing::debug!(state = ?rec.state, "Lost refresh token transition race");
                        Ok(Transition::Rejected(rec.state))
                    }
                    _ => Err(AppError::Database(format!(
                        "Transaction commit failed: {}",
                        e
                    ))),
                }
            }
        }
    }
}

// ─── User Operations ─────────────────────────────────────────

impl CredentialStore for FirestoreDb {
    async fn find_by_id(&self, id: Uuid) -> Result<UserIdentity, AppError> {
        Self::read_doc(self.get_client()?, collections::USERS, &id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn find_by_linked_auth_id(
        &self,
        linked_auth_id: &str,
    ) -> Result<Option<UserIdentity>, AppError> {
        self.find_via_index(collections::USER_LINKED_AUTHS, linked_auth_id)
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, AppError> {
        self.find_via_index(collections::USER_EMAILS, &email_key(email))
            .await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        Ok(self
            .lookup_index(collections::USER_EMAILS, &email_key(email))
            .await?
            .is_some())
    }

    async fn exists_by_nickname(&self, nickname: &str) -> Result<bool, AppError> {
        Ok(self
            .lookup_index(collections::USER_NICKNAMES, nickname)
            .await?
            .is_some())
    }

    /// Upsert a user and its index documents in one transaction.
    async fn save(&self, identity: &UserIdentity) -> Result<UserIdentity, AppError> {
        let client = self.get_client()?;
        let id = identity.id;
        let owner = IndexEntry { user_id: id };

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let tx_db = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );

        let previous: Option<UserIdentity> =
            Self::read_doc(&tx_db, collections::USERS, &id.to_string()).await?;

        let email = identity.email_key();
        let claims = [
            (collections::USER_EMAILS, email.clone()),
            (collections::USER_NICKNAMES, identity.nickname.clone()),
            (
                collections::USER_LINKED_AUTHS,
                identity.linked_auth_id().map(str::to_string),
            ),
        ];

        // 1. Claim every unique key, failing on keys owned by someone else
        for (collection, key) in &claims {
            let Some(key) = key else { continue };
            let doc_id = index_doc_id(key);
            let existing: Option<IndexEntry> = Self::read_doc(&tx_db, collection, &doc_id).await?;

            match existing {
                Some(entry) if entry.user_id != id => {
                    let _ = transaction.rollback().await;
                    return Err(if *collection == collections::USER_NICKNAMES {
                        AppError::NicknameTaken(key.clone())
                    } else if *collection == collections::USER_EMAILS {
                        AppError::AlreadyExists(identity.email.clone().unwrap_or_default())
                    } else {
                        AppError::AlreadyExists(format!("linked auth {}", key))
                    });
                }
                Some(_) => {}
                None => {
                    client
                        .fluent()
                        .update()
                        .in_col(collection)
                        .document_id(&doc_id)
                        .object(&owner)
                        .add_to_transaction(&mut transaction)
                        .map_err(|e| {
                            AppError::Database(format!(
                                "Failed to add {} claim to transaction: {}",
                                collection, e
                            ))
                        })?;
                }
            }
        }

        // 2. Release keys the previous version held but this one no longer uses
        if let Some(prev) = previous {
            let stale = [
                (collections::USER_EMAILS, prev.email_key(), email),
                (
                    collections::USER_NICKNAMES,
                    prev.nickname.clone(),
                    identity.nickname.clone(),
                ),
            ];
            for (collection, old, new) in stale {
                let Some(old) = old else { continue };
                if Some(&old) == new.as_ref() {
                    continue;
                }
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(index_doc_id(&old))
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add {} release to transaction: {}",
                            collection, e
                        ))
                    })?;
            }
        }

        // 3. Write the identity itself
        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(id.to_string())
            .object(identity)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        tracing::debug!(user_id = %id, "User saved");

        Ok(identity.clone())
    }
}

// ─── Refresh Token Operations ────────────────────────────────

impl RefreshTokenStore for FirestoreDb {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        self.write_doc(collections::REFRESH_TOKENS, &record.token_id, record)
            .await
    }

    async fn find(&self, token_id: &str, now: i64) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record: Option<RefreshTokenRecord> =
            Self::read_doc(self.get_client()?, collections::REFRESH_TOKENS, token_id).await?;

        let Some(mut record) = record else {
            return Ok(None);
        };
        if record.state != RefreshTokenState::Issued || !record.is_elapsed(now) {
            return Ok(Some(record));
        }

        // Persist the lazy expiry through the same guarded path as rotation
        match self
            .transition_in_transaction(token_id, RefreshTokenState::Expired, now, None)
            .await?
        {
            Transition::Applied(updated) => Ok(Some(updated)),
            Transition::Rejected(state) => {
                record.state = state;
                Ok(Some(record))
            }
            Transition::Missing => Ok(None),
        }
    }

    async fn transition(
        &self,
        token_id: &str,
        to: RefreshTokenState,
        now: i64,
    ) -> Result<Transition, AppError> {
        self.transition_in_transaction(token_id, to, now, None)
            .await
    }

    async fn rotate(
        &self,
        token_id: &str,
        replacement: &RefreshTokenRecord,
        now: i64,
    ) -> Result<Transition, AppError> {
        self.transition_in_transaction(token_id, RefreshTokenState::Rotated, now, Some(replacement))
            .await
    }
}
