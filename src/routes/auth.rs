// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: sign-up, sign-in, refresh and sign-out.
//!
//! Issued tokens are returned three ways: in the JSON body, in the
//! `access-token`/`refresh-token`/`user-id` response headers, and the
//! refresh token additionally as an HttpOnly cookie scoped to `/auth`.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{post, put},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::auth::{require_auth, AuthUser, ACCESS_TOKEN_HEADER};
use crate::models::TokenPair;
use crate::services::{OAuthSignUpRequest, SignInRequest, SignUpRequest};
use crate::AppState;

pub const REFRESH_TOKEN_HEADER: &str = "refresh-token";
pub const USER_ID_HEADER: &str = "user-id";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/auth";

pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/auth/oauth/sign-up", put(oauth_sign_up))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/refresh", post(refresh))
        .route("/auth/sign-out", post(sign_out))
        .merge(protected)
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub user_id: Uuid,
}

/// Refresh token from the `refresh-token` header, falling back to the cookie.
fn extract_refresh_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| jar.get(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string()))
}

fn refresh_cookie(config: &Config, pair: &TokenPair) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, pair.refresh_token.clone()))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies())
        .max_age(time::Duration::seconds(
            i64::try_from(pair.refresh_token_expires_in).unwrap_or(i64::MAX),
        ))
        .build()
}

/// Expired counterpart of [`refresh_cookie`]. Added rather than removed from
/// the jar so it is sent even when the request carried no cookie.
fn removal_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = Cookie::build((REFRESH_TOKEN_COOKIE, ""))
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies())
        .build();
    cookie.make_removal();
    cookie
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid header value: {}", e)))
}

/// Response parts shared by every endpoint that issues a token pair.
fn token_response(
    config: &Config,
    jar: CookieJar,
    pair: TokenPair,
) -> Result<(CookieJar, HeaderMap, Json<TokenPair>)> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_TOKEN_HEADER, header_value(&pair.access_token)?);
    headers.insert(REFRESH_TOKEN_HEADER, header_value(&pair.refresh_token)?);
    headers.insert(USER_ID_HEADER, header_value(&pair.user_id.to_string())?);

    let jar = jar.add(refresh_cookie(config, &pair));
    Ok((jar, headers, Json(pair)))
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>)> {
    let user_id = state.auth_service.sign_up(request).await?;
    Ok((StatusCode::CREATED, Json(SignUpResponse { user_id })))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SignInRequest>,
) -> Result<(CookieJar, HeaderMap, Json<TokenPair>)> {
    let pair = state.auth_service.sign_in(request).await?;
    token_response(&state.config, jar, pair)
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, HeaderMap, Json<TokenPair>)> {
    let token = extract_refresh_token(&headers, &jar).ok_or(AppError::InvalidToken)?;
    let pair = state.auth_service.refresh_auth(&token).await?;
    tracing::debug!(user_id = %pair.user_id, "Token pair refreshed");
    token_response(&state.config, jar, pair)
}

async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar)> {
    if let Some(token) = extract_refresh_token(&headers, &jar) {
        state.auth_service.sign_out(&token).await?;
    }

    let jar = jar.add(removal_cookie(&state.config));
    Ok((StatusCode::NO_CONTENT, jar))
}

async fn oauth_sign_up(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<OAuthSignUpRequest>,
) -> Result<StatusCode> {
    state
        .auth_service
        .oauth_sign_up(request, user.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_header_takes_precedence_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(REFRESH_TOKEN_HEADER, HeaderValue::from_static("from-header"));
        let jar = CookieJar::new().add(Cookie::new(REFRESH_TOKEN_COOKIE, "from-cookie"));

        assert_eq!(
            extract_refresh_token(&headers, &jar).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            extract_refresh_token(&HeaderMap::new(), &jar).as_deref(),
            Some("from-cookie")
        );
        assert_eq!(extract_refresh_token(&HeaderMap::new(), &CookieJar::new()), None);
    }

    #[test]
    fn refresh_cookie_is_scoped_and_http_only() {
        let config = Config::test_default();
        let pair = TokenPair {
            user_id: Uuid::new_v4(),
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            access_token_expires_in: 900,
            refresh_token_expires_in: 86400,
        };

        let cookie = refresh_cookie(&config, &pair).to_string();
        assert!(cookie.starts_with("refresh_token=r"));
        assert!(cookie.contains("Path=/auth"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(!cookie.contains("Secure"));
    }
}
