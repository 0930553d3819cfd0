// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Set FIRESTORE_EMULATOR_HOST to run them; otherwise they are skipped.
//!
//! The emulator persists across tests, so every test uses fresh ids and
//! unique emails.

use futures_util::future::join_all;
use mog_authserver::db::{CredentialStore, RefreshTokenStore};
use mog_authserver::error::AppError;
use mog_authserver::models::{
    OAuthProvider, RefreshTokenRecord, RefreshTokenState, Transition, UserIdentity,
};
use uuid::Uuid;

mod common;
use common::test_db;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

fn local_user(email: &str, nickname: &str) -> UserIdentity {
    UserIdentity::new_local(
        email.to_string(),
        nickname.to_string(),
        None,
        "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".to_string(),
        "2026-01-01T00:00:00Z",
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// CREDENTIAL STORE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_save_and_find_local_user() {
    require_emulator!();

    let db = test_db().await;
    let email = format!("{}@x.com", unique("user"));
    let user = local_user(&email, &unique("nick"));

    assert!(!db.exists_by_email(&email).await.unwrap());
    db.save(&user).await.unwrap();

    let found = db.find_by_id(user.id).await.unwrap();
    assert_eq!(found.email.as_deref(), Some(email.as_str()));
    assert!(db.exists_by_email(&email.to_uppercase()).await.unwrap());
    assert!(db
        .exists_by_nickname(user.nickname.as_deref().unwrap())
        .await
        .unwrap());

    let by_email = db.find_by_email(&email).await.unwrap().unwrap();
    assert_eq!(by_email.id, user.id);
}

#[tokio::test]
async fn test_duplicate_email_is_rejected_at_save() {
    require_emulator!();

    let db = test_db().await;
    let email = format!("{}@x.com", unique("dup"));
    db.save(&local_user(&email, &unique("first"))).await.unwrap();

    let err = db
        .save(&local_user(&email, &unique("second")))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_with_same_email_admit_one() {
    require_emulator!();

    let db = test_db().await;
    let email = format!("{}@x.com", unique("race"));
    let users: Vec<_> = (0..3)
        .map(|_| local_user(&email, &unique("racer")))
        .collect();

    let handles: Vec<_> = users
        .iter()
        .cloned()
        .map(|user| {
            let db = db.clone();
            tokio::spawn(async move { db.save(&user).await })
        })
        .collect();
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "results: {results:?}");
    for result in &results {
        if let Err(err) = result {
            // A loser either sees the winner's claim or has its commit aborted
            assert!(
                matches!(err, AppError::AlreadyExists(_) | AppError::Database(_)),
                "unexpected error: {err:?}"
            );
        }
    }

    let owner = db.find_by_email(&email).await.unwrap().unwrap();
    assert_eq!(owner.id, winners[0].id);
    for user in users.iter().filter(|u| u.id != owner.id) {
        assert!(!db
            .exists_by_nickname(user.nickname.as_deref().unwrap())
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn test_find_missing_user_is_not_found() {
    require_emulator!();

    let db = test_db().await;
    let err = db.find_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_linked_auth_lookup() {
    require_emulator!();

    let db = test_db().await;
    let linked = unique("google");
    let user = UserIdentity::new_oauth(
        OAuthProvider::Google,
        linked.clone(),
        None,
        "2026-01-01T00:00:00Z",
    );
    db.save(&user).await.unwrap();

    let found = db.find_by_linked_auth_id(&linked).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert!(db
        .find_by_linked_auth_id(&unique("google"))
        .await
        .unwrap()
        .is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// REFRESH TOKEN STORE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_refresh_token_rotation() {
    require_emulator!();

    let db = test_db().await;
    let subject = Uuid::new_v4();
    let original = RefreshTokenRecord::issued(unique("tok"), subject, now(), 3600);
    let replacement = RefreshTokenRecord::issued(unique("tok"), subject, now(), 3600);
    db.insert(&original).await.unwrap();

    let first = db
        .rotate(&original.token_id, &replacement, now())
        .await
        .unwrap();
    assert!(matches!(first, Transition::Applied(_)));

    let second = db
        .rotate(&original.token_id, &replacement, now())
        .await
        .unwrap();
    assert!(matches!(
        second,
        Transition::Rejected(RefreshTokenState::Rotated)
    ));

    let live = db.find(&replacement.token_id, now()).await.unwrap().unwrap();
    assert_eq!(live.state, RefreshTokenState::Issued);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotation_has_single_winner() {
    require_emulator!();

    let db = test_db().await;
    let subject = Uuid::new_v4();
    let original = RefreshTokenRecord::issued(unique("tok"), subject, now(), 3600);
    db.insert(&original).await.unwrap();

    let replacements: Vec<_> = (0..3)
        .map(|_| RefreshTokenRecord::issued(unique("tok"), subject, now(), 3600))
        .collect();
    let handles: Vec<_> = replacements
        .iter()
        .cloned()
        .map(|replacement| {
            let db = db.clone();
            let token_id = original.token_id.clone();
            tokio::spawn(async move { db.rotate(&token_id, &replacement, now()).await })
        })
        .collect();
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let applied = results
        .iter()
        .filter(|r| matches!(r, Ok(Transition::Applied(_))))
        .count();
    assert_eq!(applied, 1, "results: {results:?}");
    for result in &results {
        assert!(
            matches!(
                result,
                Ok(Transition::Applied(_))
                    | Ok(Transition::Rejected(RefreshTokenState::Rotated))
                    | Err(AppError::Database(_))
            ),
            "unexpected outcome: {result:?}"
        );
    }

    let consumed = db.find(&original.token_id, now()).await.unwrap().unwrap();
    assert_eq!(consumed.state, RefreshTokenState::Rotated);

    // Only the winner's replacement was written
    let mut live = 0;
    for replacement in &replacements {
        if db.find(&replacement.token_id, now()).await.unwrap().is_some() {
            live += 1;
        }
    }
    assert_eq!(live, 1);
}

#[tokio::test]
async fn test_refresh_token_lazy_expiry() {
    require_emulator!();

    let db = test_db().await;
    let record = RefreshTokenRecord::issued(unique("tok"), Uuid::new_v4(), now() - 100, 10);
    db.insert(&record).await.unwrap();

    let found = db.find(&record.token_id, now()).await.unwrap().unwrap();
    assert_eq!(found.state, RefreshTokenState::Expired);

    let revoke = db
        .transition(&record.token_id, RefreshTokenState::Revoked, now())
        .await
        .unwrap();
    assert!(matches!(
        revoke,
        Transition::Rejected(RefreshTokenState::Expired)
    ));
}

#[tokio::test]
async fn test_missing_refresh_token() {
    require_emulator!();

    let db = test_db().await;
    assert!(db.find(&unique("tok"), now()).await.unwrap().is_none());
    assert!(matches!(
        db.transition(&unique("tok"), RefreshTokenState::Revoked, now())
            .await
            .unwrap(),
        Transition::Missing
    ));
}
