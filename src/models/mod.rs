// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod token;
pub mod user;

pub use token::{RefreshTokenRecord, RefreshTokenState, TokenPair, Transition};
pub use user::{
    CredentialView, LoginSource, OAuthProvider, ProfileCompletion, UserIdentity, UserProfileView,
};
