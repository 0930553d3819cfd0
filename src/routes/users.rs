// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile lookup for the authenticated user.

use axum::{extract::State, routing::get, Extension, Json, Router};
use std::sync::Arc;

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::UserProfileView;
use crate::AppState;

/// Routes that require authentication; the caller applies `require_auth`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/me/oauth", get(get_me_oauth))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfileView>> {
    let profile = state.auth_service.find_user_info_by_id(user.user_id).await?;
    Ok(Json(profile))
}

/// Fails with 400 for local accounts.
async fn get_me_oauth(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfileView>> {
    let profile = state
        .auth_service
        .find_oauth2_user_info_by_id(user.user_id)
        .await?;
    Ok(Json(profile))
}
