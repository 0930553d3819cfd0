// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The JWT signing key is read once at startup and never changes for the
//! lifetime of the process.

use std::env;
use std::str::FromStr;

/// Minimum accepted length of the HS256 signing key, in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Upper bound for either token lifetime: one year.
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// GCP project ID; selects the Firestore backend when present
    pub gcp_project_id: Option<String>,
    /// `iss` claim of issued access tokens
    pub jwt_issuer: String,
    /// Access token lifetime in seconds
    pub access_token_ttl_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_secs: u64,
    /// Argon2id memory cost in KiB
    pub argon2_memory_kib: u32,
    /// Argon2id iteration count
    pub argon2_iterations: u32,

    // --- Secrets ---
    /// JWT signing key for access tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Optional pepper prepended to passwords before hashing
    pub password_pepper: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local
    /// development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        if jwt_signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SIGNING_KEY",
                reason: format!("must be at least {MIN_SIGNING_KEY_LEN} bytes"),
            });
        }

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_or("PORT", 8080)?,
            gcp_project_id: env::var("GCP_PROJECT_ID")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "mog-authserver".to_string()),
            access_token_ttl_secs: ttl_or("ACCESS_TOKEN_TTL_SECS", 30 * 60)?,
            refresh_token_ttl_secs: ttl_or("REFRESH_TOKEN_TTL_SECS", 14 * 24 * 60 * 60)?,
            argon2_memory_kib: parse_or("ARGON2_MEMORY_KIB", 19 * 1024)?,
            argon2_iterations: parse_or("ARGON2_ITERATIONS", 2)?,
            jwt_signing_key,
            password_pepper: env::var("PASSWORD_PEPPER")
                .ok()
                .filter(|v| !v.is_empty()),
        })
    }

    /// Deterministic configuration for tests: in-memory store and cheap
    /// Argon2 parameters.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            gcp_project_id: None,
            jwt_issuer: "mog-authserver-test".to_string(),
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 24 * 60 * 60,
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!!".to_vec(),
            password_pepper: None,
        }
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// A token lifetime in seconds, within `1..=MAX_TOKEN_TTL_SECS`.
fn ttl_or(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let ttl = parse_or(name, default)?;
    if ttl == 0 || ttl > MAX_TOKEN_TTL_SECS {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be between 1 and {MAX_TOKEN_TTL_SECS} seconds"),
        });
    }
    Ok(ttl)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
