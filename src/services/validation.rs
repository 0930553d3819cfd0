// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-only uniqueness checks against the credential store.
//!
//! These checks give early, friendly rejections. They are not race-safe on
//! their own; `CredentialStore::save` enforces uniqueness at write time.

use crate::db::CredentialStore;
use crate::error::AppError;

#[derive(Clone)]
pub struct ValidationService<C: CredentialStore> {
    users: C,
}

impl<C: CredentialStore> ValidationService<C> {
    pub fn new(users: C) -> Self {
        Self { users }
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        self.users.exists_by_email(email).await
    }

    pub async fn nickname_exists(&self, nickname: &str) -> Result<bool, AppError> {
        self.users.exists_by_nickname(nickname).await
    }

    /// Fails with `AlreadyExists(email)` if the email is taken.
    pub async fn ensure_email_available(&self, email: &str) -> Result<(), AppError> {
        if self.email_exists(email).await? {
            return Err(AppError::AlreadyExists(email.to_string()));
        }
        Ok(())
    }

    /// Fails with `NicknameTaken(nickname)` if the nickname is taken.
    pub async fn ensure_nickname_available(&self, nickname: &str) -> Result<(), AppError> {
        if self.nickname_exists(nickname).await? {
            return Err(AppError::NicknameTaken(nickname.to_string()));
        }
        Ok(())
    }
}
