// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod password;
pub mod token;
pub mod validation;

pub use auth::{AuthService, OAuthLogin, OAuthSignUpRequest, SignInRequest, SignUpRequest};
pub use password::PasswordService;
pub use token::{AccessTokenClaims, TokenService};
pub use validation::ValidationService;
