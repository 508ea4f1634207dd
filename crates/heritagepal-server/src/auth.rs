//! Bearer-token authentication.
//!
//! Tokens are issued by the store's auth service; this module only extracts
//! them from the `Authorization` header and asks the store who they belong
//! to. Handlers pick the extractor matching the access level they need.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use heritagepal_store::UserProfile;
use tracing::{debug, warn};

use crate::api::{ApiError, AppState};

const NO_TOKEN: &str = "Not authorized, no token provided";
const INVALID_TOKEN: &str = "Invalid authentication token";
const NOT_ADMIN: &str = "Not authorized as an admin";
const AUTH_FAILED: &str = "Authentication failed";

/// Returns the bearer token of a request, if present.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .split_whitespace()
        .next()
}

/// Resolves `token` to a profile.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` if the token is unknown or the store
/// cannot verify it.
pub async fn authenticate(state: &AppState, token: &str) -> Result<UserProfile, ApiError> {
    match state.store.resolve_user(token).await {
        Ok(Some(profile)) => {
            debug!(user_id = %profile.id, "Authenticated request");
            Ok(profile)
        }
        Ok(None) => Err(ApiError::Unauthorized(INVALID_TOKEN.to_string())),
        Err(e) => {
            warn!(error = %e, "Token verification failed");
            Err(ApiError::Unauthorized(AUTH_FAILED.to_string()))
        }
    }
}

/// The raw bearer token; the request is rejected when it is missing.
///
/// Resolving the token is left to the handler, which lets it validate its
/// input before touching the store.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    /// Resolves the token to a profile.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if the token is not valid.
    pub async fn resolve(&self, state: &AppState) -> Result<UserProfile, ApiError> {
        authenticate(state, &self.0).await
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for BearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers)
            .map(|token| Self(token.to_string()))
            .ok_or_else(|| ApiError::Unauthorized(NO_TOKEN.to_string()))
    }
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = BearerToken::from_request_parts(parts, state).await?;
        token.resolve(state).await.map(Self)
    }
}

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub UserProfile);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(profile) = AuthUser::from_request_parts(parts, state).await?;
        if profile.is_admin() {
            Ok(Self(profile))
        } else {
            warn!(user_id = %profile.id, "Non-admin called an admin route");
            Err(ApiError::Forbidden(NOT_ADMIN.to_string()))
        }
    }
}

/// The caller's profile if a valid token was sent; never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserProfile>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Self(None));
        };
        Ok(Self(authenticate(state, token).await.ok()))
    }
}

impl MaybeUser {
    /// Returns the caller's id, if authenticated.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.as_ref().map(|profile| profile.id.as_str())
    }
}
