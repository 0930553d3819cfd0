// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use mog_authserver::config::Config;
use mog_authserver::db::{FirestoreDb, MemoryStore, Store};
use mog_authserver::routes::create_router;
use mog_authserver::services::{AuthService, SignUpRequest};
use mog_authserver::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Auth service over a fresh in-memory store. The store handle is returned
/// so tests can inspect refresh token bookkeeping.
#[allow(dead_code)]
pub fn test_auth_service() -> (AuthService<MemoryStore, MemoryStore>, MemoryStore) {
    test_auth_service_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn test_auth_service_with_config(
    config: Config,
) -> (AuthService<MemoryStore, MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    let service = AuthService::new(store.clone(), store.clone(), &config)
        .expect("Failed to build auth service");
    (service, store)
}

#[allow(dead_code)]
pub fn sign_up_request(email: &str, nickname: &str, password: &str) -> SignUpRequest {
    SignUpRequest {
        email: email.to_string(),
        nickname: nickname.to_string(),
        password: password.to_string(),
        name: None,
    }
}

/// Create a test app over an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let store = Store::Memory(MemoryStore::new());
    let state = Arc::new(AppState::new(config, store).expect("Failed to build app state"));
    (create_router(state.clone()), state)
}
