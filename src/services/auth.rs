// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication orchestration: sign-up, sign-in, linked OAuth sign-up,
//! sign-out, token refresh and identity lookup.
//!
//! This is the single entry point the HTTP layer talks to. Errors from the
//! stores and the token service propagate unchanged, with one exception:
//! sign-out of an already unusable refresh token succeeds silently.

use crate::config::Config;
use crate::db::{CredentialStore, RefreshTokenStore};
use crate::error::AppError;
use crate::models::{
    CredentialView, OAuthProvider, ProfileCompletion, TokenPair, UserIdentity, UserProfileView,
};
use crate::services::password::PasswordService;
use crate::services::token::TokenService;
use crate::services::validation::ValidationService;
use crate::time_utils::now_rfc3339;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Local sign-up request.
#[derive(Clone, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 30))]
    pub nickname: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub name: Option<String>,
}

/// Local sign-in request.
#[derive(Clone, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Profile completion for a provisioned federated identity.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OAuthSignUpRequest {
    #[validate(length(min = 1, max = 30))]
    pub nickname: String,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[validate(url)]
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// Result of the upstream OAuth provisioning step.
#[derive(Debug, Clone)]
pub struct OAuthLogin {
    pub user_id: Uuid,
    pub tokens: TokenPair,
    /// True until the linked sign-up has filled the profile
    pub profile_pending: bool,
}

/// Authentication service.
///
/// Generic over store implementations so the same logic runs against
/// Firestore in production and in-memory tables in tests.
#[derive(Clone)]
pub struct AuthService<C: CredentialStore, R: RefreshTokenStore> {
    users: C,
    validation: ValidationService<C>,
    tokens: TokenService<R>,
    passwords: PasswordService,
}

impl<C: CredentialStore, R: RefreshTokenStore> AuthService<C, R> {
    pub fn new(users: C, refresh_tokens: R, config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            validation: ValidationService::new(users.clone()),
            users,
            tokens: TokenService::new(refresh_tokens, config),
            passwords: PasswordService::from_config(config)?,
        })
    }

    pub fn tokens(&self) -> &TokenService<R> {
        &self.tokens
    }

    /// Create a local account. Returns the new user's id.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<Uuid, AppError> {
        request.validate()?;

        self.validation
            .ensure_email_available(&request.email)
            .await?;
        self.validation
            .ensure_nickname_available(&request.nickname)
            .await?;

        let password_hash = self.passwords.hash_blocking(request.password).await?;
        let identity = UserIdentity::new_local(
            request.email.trim().to_string(),
            request.nickname,
            request.name,
            password_hash,
            &now_rfc3339(),
        );

        // The store re-checks uniqueness atomically; a racing sign-up fails here.
        let saved = self.users.save(&identity).await?;

        tracing::info!(user_id = %saved.id, "Local user signed up");
        Ok(saved.id)
    }

    /// Verify local credentials and issue a token pair.
    pub async fn sign_in(&self, request: SignInRequest) -> Result<TokenPair, AppError> {
        request.validate()?;

        let Some(user) = self.users.find_by_email(&request.email).await? else {
            self.passwords.verify_dummy_blocking(request.password).await?;
            return Err(AppError::InvalidCredentials);
        };

        let credentials = self.find_user_info_pass(user.id).await?;
        let Some(password_hash) = credentials.password_hash else {
            tracing::warn!(user_id = %user.id, "Password sign-in attempted for OAuth user");
            self.passwords.verify_dummy_blocking(request.password).await?;
            return Err(AppError::InvalidCredentials);
        };

        if !self
            .passwords
            .verify_blocking(request.password, password_hash)
            .await?
        {
            tracing::warn!(user_id = %user.id, "Password mismatch on sign-in");
            return Err(AppError::InvalidCredentials);
        }

        let pair = self.tokens.issue_token_pair(user.id).await?;
        tracing::info!(user_id = %user.id, "Local user signed in");
        Ok(pair)
    }

    /// Find or create the identity for an upstream federated login and
    /// issue a token pair. New identities await linked sign-up.
    pub async fn provision_oauth_identity(
        &self,
        provider: OAuthProvider,
        linked_auth_id: &str,
        email: Option<String>,
    ) -> Result<OAuthLogin, AppError> {
        let user = match self.users.find_by_linked_auth_id(linked_auth_id).await? {
            Some(user) => user,
            None => {
                if let Some(email) = &email {
                    self.validation.ensure_email_available(email).await?;
                }
                let identity = UserIdentity::new_oauth(
                    provider,
                    linked_auth_id.to_string(),
                    email,
                    &now_rfc3339(),
                );
                let saved = self.users.save(&identity).await?;
                tracing::info!(user_id = %saved.id, provider = %provider, "OAuth identity provisioned");
                saved
            }
        };

        let tokens = self.tokens.issue_token_pair(user.id).await?;
        Ok(OAuthLogin {
            user_id: user.id,
            profile_pending: !user.profile_completed(),
            tokens,
        })
    }

    /// Linked sign-up: fill the profile of a provisioned identity.
    pub async fn oauth_sign_up(&self, request: OAuthSignUpRequest, id: Uuid) -> Result<(), AppError> {
        request.validate()?;

        let mut user = self.users.find_by_id(id).await?;

        if user.nickname.as_deref() != Some(request.nickname.as_str()) {
            self.validation
                .ensure_nickname_available(&request.nickname)
                .await?;
        }

        user.complete_profile(
            ProfileCompletion {
                nickname: request.nickname,
                name: request.name,
                birth_date: request.birth_date,
                profile_image_url: request.profile_image_url,
            },
            &now_rfc3339(),
        );
        self.users.save(&user).await?;

        tracing::info!(user_id = %id, "Linked sign-up completed");
        Ok(())
    }

    /// Revoke a refresh token. Repeated calls are indistinguishable from the first.
    pub async fn sign_out(&self, refresh_token: &str) -> Result<(), AppError> {
        match self.tokens.revoke_refresh_token(refresh_token).await {
            Ok(()) => Ok(()),
            Err(AppError::InvalidToken) => {
                tracing::debug!("Sign-out with unusable refresh token ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Exchange a refresh token for a new pair.
    pub async fn refresh_auth(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        self.tokens
            .validate_refresh_token_existence(refresh_token)
            .await?;
        self.tokens.regenerate_token_set(refresh_token).await
    }

    pub async fn find_user_info_by_id(&self, id: Uuid) -> Result<UserProfileView, AppError> {
        let user = self.users.find_by_id(id).await?;
        Ok(UserProfileView::from(&user))
    }

    /// Internal view including the password hash. Not for API responses.
    pub async fn find_user_info_pass(&self, id: Uuid) -> Result<CredentialView, AppError> {
        let user = self.users.find_by_id(id).await?;
        Ok(CredentialView::from(&user))
    }

    /// Profile of a federated identity; local identities are rejected.
    pub async fn find_oauth2_user_info_by_id(&self, id: Uuid) -> Result<UserProfileView, AppError> {
        let user = self.users.find_by_id(id).await?;
        if user.login_source.is_local() {
            return Err(AppError::NotOAuthUser(id));
        }
        Ok(UserProfileView::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn service() -> AuthService<MemoryStore, MemoryStore> {
        let store = MemoryStore::new();
        AuthService::new(store.clone(), store, &Config::test_default()).unwrap()
    }

    fn sign_up_request(email: &str, nickname: &str, password: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            nickname: nickname.to_string(),
            password: password.to_string(),
            name: None,
        }
    }

    #[tokio::test]
    async fn test_sign_up_rejects_malformed_email() {
        let err = service()
            .sign_up(sign_up_request("not-an-email", "alice", "p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_taken_nickname() {
        let auth = service();
        auth.sign_up(sign_up_request("a@x.com", "alice", "p1"))
            .await
            .unwrap();

        let err = auth
            .sign_up(sign_up_request("b@x.com", "alice", "p2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NicknameTaken(ref n) if n == "alice"));
    }

    #[tokio::test]
    async fn test_password_is_stored_hashed() {
        let auth = service();
        let id = auth
            .sign_up(sign_up_request("a@x.com", "alice", "p1"))
            .await
            .unwrap();

        let creds = auth.find_user_info_pass(id).await.unwrap();
        let hash = creds.password_hash.unwrap();
        assert_ne!(hash, "p1");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let auth = service();
        let id = auth
            .sign_up(sign_up_request("a@x.com", "alice", "p1"))
            .await
            .unwrap();

        let pair = auth
            .sign_in(SignInRequest {
                email: "A@x.com".to_string(),
                password: "p1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(pair.user_id, id);

        let err = auth
            .sign_in(SignInRequest {
                email: "a@x.com".to_string(),
                password: "p2".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_unknown_email_is_indistinguishable_from_wrong_password() {
        let auth = service();
        auth.sign_up(sign_up_request("a@x.com", "alice", "p1"))
            .await
            .unwrap();

        let wrong_password = auth
            .sign_in(SignInRequest {
                email: "a@x.com".to_string(),
                password: "p2".to_string(),
            })
            .await
            .unwrap_err();
        let unknown_email = auth
            .sign_in(SignInRequest {
                email: "nobody@x.com".to_string(),
                password: "p2".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(unknown_email, AppError::InvalidCredentials));
        assert_eq!(unknown_email.to_string(), wrong_password.to_string());
    }

    #[tokio::test]
    async fn test_sign_in_rejects_oauth_identity() {
        let auth = service();
        auth.provision_oauth_identity(
            OAuthProvider::Google,
            "google-1",
            Some("g@x.com".to_string()),
        )
        .await
        .unwrap();

        let err = auth
            .sign_in(SignInRequest {
                email: "g@x.com".to_string(),
                password: "anything".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_provisioning_is_stable_per_linked_auth_id() {
        let auth = service();
        let first = auth
            .provision_oauth_identity(OAuthProvider::Kakao, "kakao-9", None)
            .await
            .unwrap();
        assert!(first.profile_pending);

        let second = auth
            .provision_oauth_identity(OAuthProvider::Kakao, "kakao-9", None)
            .await
            .unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert_ne!(first.tokens.refresh_token, second.tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_oauth_sign_up_completes_profile() {
        let auth = service();
        let login = auth
            .provision_oauth_identity(OAuthProvider::Naver, "naver-3", None)
            .await
            .unwrap();

        auth.oauth_sign_up(
            OAuthSignUpRequest {
                nickname: "neo".to_string(),
                name: Some("Neo".to_string()),
                birth_date: NaiveDate::from_ymd_opt(1999, 3, 31),
                profile_image_url: None,
            },
            login.user_id,
        )
        .await
        .unwrap();

        let profile = auth.find_oauth2_user_info_by_id(login.user_id).await.unwrap();
        assert_eq!(profile.nickname.as_deref(), Some("neo"));
        assert_eq!(profile.login_source, "naver");
        assert!(profile.profile_completed);
    }

    #[tokio::test]
    async fn test_oauth_sign_up_unknown_id_is_not_found() {
        let err = service()
            .oauth_sign_up(
                OAuthSignUpRequest {
                    nickname: "ghost".to_string(),
                    name: None,
                    birth_date: None,
                    profile_image_url: None,
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
