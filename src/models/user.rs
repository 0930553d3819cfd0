// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User identity model for storage and API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;

/// Federated identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Google,
    Kakao,
    Naver,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Kakao => "kakao",
            OAuthProvider::Naver => "naver",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a user authenticates. Fixed at creation.
///
/// Only local accounts carry a password hash; only federated accounts carry
/// the id of the upstream auth record they were provisioned from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoginSource {
    Local {
        password_hash: String,
    },
    #[serde(rename = "oauth")]
    OAuth {
        provider: OAuthProvider,
        linked_auth_id: String,
    },
}

impl LoginSource {
    pub fn is_local(&self) -> bool {
        matches!(self, LoginSource::Local { .. })
    }

    /// Public tag: `local` or the provider name.
    pub fn tag(&self) -> &'static str {
        match self {
            LoginSource::Local { .. } => "local",
            LoginSource::OAuth { provider, .. } => provider.as_str(),
        }
    }
}

impl fmt::Debug for LoginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginSource::Local { .. } => f
                .debug_struct("Local")
                .field("password_hash", &"<redacted>")
                .finish(),
            LoginSource::OAuth {
                provider,
                linked_auth_id,
            } => f
                .debug_struct("OAuth")
                .field("provider", provider)
                .field("linked_auth_id", linked_auth_id)
                .finish(),
        }
    }
}

/// One principal, stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Generated on creation (also used as document ID)
    pub id: Uuid,
    /// Required for local accounts; may be absent for federated ones
    pub email: Option<String>,
    /// Unique display handle; absent until a federated profile is completed
    pub nickname: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_image_url: Option<String>,
    pub login_source: LoginSource,
    pub created_at: String,
    pub updated_at: String,
}

impl UserIdentity {
    /// Build a fully populated local account. `password_hash` must already be hashed.
    pub fn new_local(
        email: String,
        nickname: String,
        name: Option<String>,
        password_hash: String,
        now: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: Some(email),
            nickname: Some(nickname),
            name,
            birth_date: None,
            profile_image_url: None,
            login_source: LoginSource::Local { password_hash },
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    /// Build a provisioned federated identity awaiting linked sign-up.
    pub fn new_oauth(
        provider: OAuthProvider,
        linked_auth_id: String,
        email: Option<String>,
        now: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            nickname: None,
            name: None,
            birth_date: None,
            profile_image_url: None,
            login_source: LoginSource::OAuth {
                provider,
                linked_auth_id,
            },
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    pub fn password_hash(&self) -> Option<&str> {
        match &self.login_source {
            LoginSource::Local { password_hash } => Some(password_hash),
            LoginSource::OAuth { .. } => None,
        }
    }

    pub fn linked_auth_id(&self) -> Option<&str> {
        match &self.login_source {
            LoginSource::Local { .. } => None,
            LoginSource::OAuth { linked_auth_id, .. } => Some(linked_auth_id),
        }
    }

    /// Federated identities stay pending until a nickname is chosen.
    pub fn profile_completed(&self) -> bool {
        self.nickname.is_some()
    }

    /// Case-insensitive uniqueness key for the email, if any.
    pub fn email_key(&self) -> Option<String> {
        self.email.as_deref().map(email_key)
    }

    /// Merge linked sign-up fields. Never touches `login_source`.
    pub fn complete_profile(&mut self, profile: ProfileCompletion, now: &str) {
        self.nickname = Some(profile.nickname);
        if profile.name.is_some() {
            self.name = profile.name;
        }
        if profile.birth_date.is_some() {
            self.birth_date = profile.birth_date;
        }
        if profile.profile_image_url.is_some() {
            self.profile_image_url = profile.profile_image_url;
        }
        self.updated_at = now.to_string();
    }
}

/// Normalize an email for uniqueness checks.
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Profile fields supplied by a linked sign-up.
#[derive(Debug, Clone)]
pub struct ProfileCompletion {
    pub nickname: String,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_image_url: Option<String>,
}

/// Response-safe projection of a user. Never includes the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfileView {
    pub id: Uuid,
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub profile_image_url: Option<String>,
    pub login_source: String,
    pub profile_completed: bool,
    pub created_at: String,
}

impl From<&UserIdentity> for UserProfileView {
    fn from(user: &UserIdentity) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            name: user.name.clone(),
            birth_date: user.birth_date,
            profile_image_url: user.profile_image_url.clone(),
            login_source: user.login_source.tag().to_string(),
            profile_completed: user.profile_completed(),
            created_at: user.created_at.clone(),
        }
    }
}

/// Internal view carrying the password hash, for local sign-in only.
#[derive(Clone)]
pub struct CredentialView {
    pub id: Uuid,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl From<&UserIdentity> for CredentialView {
    fn from(user: &UserIdentity) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            password_hash: user.password_hash().map(str::to_string),
        }
    }
}

impl fmt::Debug for CredentialView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialView")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
