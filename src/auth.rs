//! Request identity.
//!
//! Tokens are issued and checked elsewhere; by the time a request reaches this
//! service the caller's id and role travel in plain headers.

use crate::error::AppError;
use crate::models::{Actor, Role};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?
            .to_string();
        let role: Role = header(parts, ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?
            .parse()
            .map_err(|_| AppError::Unauthorized("Unknown role".into()))?;

        Ok(Actor { id, role })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Only mentors get past this.
pub fn require_mentor(actor: &Actor) -> Result<(), AppError> {
    if actor.is_mentor() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Mentor role required".into()))
    }
}
