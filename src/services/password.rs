// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password hashing and verification using Argon2id.
//!
//! Hashes are PHC strings with a random per-password salt. Verification
//! re-derives the hash from the candidate and compares; nothing is ever
//! decrypted.

use crate::config::Config;
use crate::error::AppError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

/// Argon2id hasher with an optional pepper.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    pepper: Option<String>,
    /// Hash of a throwaway password under the same parameters.
    dummy_hash: String,
}

impl PasswordService {
    pub fn new(memory_kib: u32, iterations: u32, pepper: Option<String>) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid Argon2 parameters: {}", e)))?;

        let mut service = Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            pepper,
            dummy_hash: String::new(),
        };
        service.dummy_hash = service.hash("mog-authserver placeholder")?;
        Ok(service)
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.password_pepper.clone(),
        )
    }

    fn peppered(&self, password: &str) -> String {
        match &self.pepper {
            Some(p) => format!("{p}{password}"),
            None => password.to_string(),
        }
    }

    /// Hash a plaintext password into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(self.peppered(password).as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))
    }

    /// Returns `Ok(false)` on mismatch and an error only for a malformed hash.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid password hash: {}", e)))?;

        match self
            .argon2
            .verify_password(self.peppered(password).as_bytes(), &parsed)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(anyhow::anyhow!(
                "Password verification failed: {}",
                e
            ))),
        }
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing task failed: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    pub async fn verify_blocking(&self, password: String, hash: String) -> Result<bool, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Verification task failed: {}", e)))?
    }

    /// Run a full verification against the throwaway hash and discard the
    /// result. Sign-in calls this when there is no stored hash to check, so
    /// an unknown account costs as much as a wrong password.
    pub async fn verify_dummy_blocking(&self, password: String) -> Result<(), AppError> {
        self.verify_blocking(password, self.dummy_hash.clone())
            .await
            .map(|_| ())
    }
}
