//! Bearer-token sessions.
//!
//! Sessions live in an in-memory token registry; a middleware resolves the
//! `Authorization` header to a user and attaches it to the request. Routes
//! then enforce their own requirement (public, user, or admin).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::ApiState;
use crate::error::ApiError;
use crate::store::{EntityId, User};

/// Caller identity attached to every request. `None` means anonymous.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<User>);

/// In-memory session registry (token -> user id).
#[derive(Clone, Default)]
pub struct SessionStore {
    tokens: Arc<RwLock<HashMap<String, EntityId>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session token for a user.
    pub async fn create_token(&self, user_id: EntityId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.write().await.insert(token.clone(), user_id);
        token
    }

    pub async fn revoke(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }

    pub async fn resolve(&self, token: &str) -> Option<EntityId> {
        self.tokens.read().await.get(token).copied()
    }
}

/// Resolve the bearer token (if any) to a user and attach the identity to
/// the request.
///
/// A missing header yields an anonymous caller. A token that does not
/// resolve is rejected outright, so a stale session never degrades to
/// anonymous access.
pub async fn attach_identity(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let user = match header.and_then(|h| h.strip_prefix("Bearer ")) {
        None => None,
        Some(token) => {
            let user_id = state
                .sessions
                .resolve(token)
                .await
                .ok_or(StatusCode::UNAUTHORIZED)?;
            let user = state
                .store
                .user(user_id)
                .await
                .ok_or(StatusCode::UNAUTHORIZED)?;
            Some(user)
        }
    };

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Require a logged-in caller.
pub fn require_user(current: &CurrentUser) -> Result<&User, ApiError> {
    current.0.as_ref().ok_or(ApiError::Unauthorized)
}

/// Require a site administrator.
pub fn require_admin(current: &CurrentUser) -> Result<&User, ApiError> {
    let user = require_user(current)?;
    if !user.admin {
        return Err(ApiError::PermissionDenied(
            "administrator access required".to_string(),
        ));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_round_trip() {
        let sessions = SessionStore::new();
        let user_id = Uuid::new_v4();

        let token = sessions.create_token(user_id).await;
        assert_eq!(sessions.resolve(&token).await, Some(user_id));

        sessions.revoke(&token).await;
        assert_eq!(sessions.resolve(&token).await, None);
    }

    #[test]
    fn guards_reject_anonymous_and_plain_users() {
        let anon = CurrentUser(None);
        assert!(matches!(
            require_user(&anon),
            Err(ApiError::Unauthorized)
        ));

        let plain = CurrentUser(Some(User {
            id: Uuid::new_v4(),
            login: "alice".to_string(),
            admin: false,
        }));
        assert!(require_user(&plain).is_ok());
        assert!(matches!(
            require_admin(&plain),
            Err(ApiError::PermissionDenied(_))
        ));
    }
}
