// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Concurrency tests for refresh token rotation and sign-up uniqueness.
//!
//! These run on the multi-threaded runtime so racing tasks actually
//! interleave against the shared store.

use futures_util::future::join_all;
use mog_authserver::error::AppError;
use mog_authserver::services::SignInRequest;
use std::sync::Arc;
use uuid::Uuid;

mod common;
use common::{sign_up_request, test_auth_service};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rotation_has_single_winner() {
    let (service, store) = test_auth_service();
    let service = Arc::new(service);
    let pair = service
        .tokens()
        .issue_token_pair(Uuid::new_v4())
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = service.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { service.refresh_auth(&token).await })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::InvalidToken)))
        .count();
    assert_eq!(winners, 1, "exactly one rotation must succeed");
    assert_eq!(losers, 1, "the other must fail with InvalidToken");

    // Original plus exactly one replacement
    assert_eq!(store.refresh_token_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_rotations_have_single_winner() {
    let (service, store) = test_auth_service();
    let service = Arc::new(service);
    let pair = service
        .tokens()
        .issue_token_pair(Uuid::new_v4())
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            let token = pair.refresh_token.clone();
            tokio::spawn(async move { service.tokens().regenerate_token_set(&token).await })
        })
        .collect();

    let winners: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap().ok())
        .collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(store.refresh_token_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rotation_racing_sign_out_leaves_one_outcome() {
    let (service, _) = test_auth_service();
    let service = Arc::new(service);
    service
        .sign_up(sign_up_request("a@x.com", "alice", "p1"))
        .await
        .unwrap();
    let pair = service
        .sign_in(SignInRequest {
            email: "a@x.com".to_string(),
            password: "p1".to_string(),
        })
        .await
        .unwrap();

    let rotate = {
        let service = service.clone();
        let token = pair.refresh_token.clone();
        tokio::spawn(async move { service.tokens().regenerate_token_set(&token).await })
    };
    let revoke = {
        let service = service.clone();
        let token = pair.refresh_token.clone();
        tokio::spawn(async move { service.tokens().revoke_refresh_token(&token).await })
    };

    let rotated = rotate.await.unwrap();
    let revoked = revoke.await.unwrap();

    // Exactly one of the two transitions out of Issued wins
    assert!(rotated.is_ok() ^ revoked.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sign_up_same_email_single_winner() {
    let (service, _) = test_auth_service();
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .sign_up(sign_up_request("race@x.com", &format!("racer{i}"), "p1"))
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppError::AlreadyExists(_))));
}
