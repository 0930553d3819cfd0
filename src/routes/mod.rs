// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod auth;
pub mod users;

use crate::config::Config;
use crate::middleware::auth::{require_auth, ACCESS_TOKEN_HEADER};
use crate::middleware::security::add_security_headers;
use crate::AppState;
use axum::http::{header, request::Parts, HeaderName, HeaderValue, Method};
use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
    pub store: String,
}

/// Health check response
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
        store: state.store_backend.to_string(),
    })
}

/// CORS for the configured frontend plus local dev origins. Token headers
/// are both accepted and exposed so the frontend can read them.
fn cors_layer(config: &Config) -> CorsLayer {
    let token_headers = [
        HeaderName::from_static(ACCESS_TOKEN_HEADER),
        HeaderName::from_static(auth::REFRESH_TOKEN_HEADER),
        HeaderName::from_static(auth::USER_ID_HEADER),
    ];

    let frontend_url = config.frontend_url.clone();
    let allowed = AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
        let origin = origin.to_str().unwrap_or("");
        origin == frontend_url
            || origin.starts_with("http://localhost")
            || origin.starts_with("http://127.0.0.1")
    });

    let mut request_headers = vec![header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];
    request_headers.extend(token_headers.iter().take(2).cloned());

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(request_headers)
        .expose_headers(token_headers)
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);

    // Public routes (no auth required); linked sign-up guards itself
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .merge(auth::routes(state.clone()));

    // Protected routes (auth required)
    let protected_routes =
        users::routes().route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(add_security_headers))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
