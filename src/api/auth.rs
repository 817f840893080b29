//! Session resolution and role gates.
//!
//! The session token is read from the configured cookie, falling back to an
//! `Authorization: Bearer` header for API clients.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{Role, User};

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers, &state.config.session_cookie) else {
            tracing::warn!("Missing session token");
            return Err(AppError::Unauthenticated);
        };

        match state.db.get_user_by_session(&token)? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                tracing::warn!("Unknown session token");
                Err(AppError::Unauthenticated)
            }
        }
    }
}

/// Extracts the session token from the request headers.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
        })
        .filter(|t| !t.is_empty())
}

pub fn require_student(user: &User) -> AppResult<()> {
    match user.role {
        Role::Student => Ok(()),
        _ => Err(AppError::forbidden("Student role required")),
    }
}

pub fn require_staff(user: &User) -> AppResult<()> {
    if user.role.is_staff() {
        Ok(())
    } else {
        Err(AppError::forbidden("Teacher or admin role required"))
    }
}

pub fn require_admin(user: &User) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        _ => Err(AppError::forbidden("Admin role required")),
    }
}
