// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Mog auth server: account authentication and token lifecycle.
//!
//! This crate provides local and linked-OAuth sign-up, password sign-in,
//! short-lived access tokens and rotating refresh tokens, backed by
//! Firestore or an in-memory store.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use error::AppError;
use services::AuthService;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth_service: AuthService<Store, Store>,
    pub store_backend: &'static str,
}

impl AppState {
    /// Wire services over a single store serving both users and refresh tokens.
    pub fn new(config: Config, store: Store) -> Result<Self, AppError> {
        let store_backend = store.backend_name();
        let auth_service = AuthService::new(store.clone(), store, &config)?;
        Ok(Self {
            config,
            auth_service,
            store_backend,
        })
    }
}
