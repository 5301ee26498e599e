//! Request authentication and role resolution.
//!
//! `AuthUser` and `AdminUser` are axum extractors: the bearer token is
//! resolved by the identity provider, then the role is looked up once and
//! cached per user. Any role-lookup failure resolves to `Customer`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::AppError;
use crate::guards::{self, GuardDecision};
use crate::handlers::AppState;
use crate::identity_client::IdentityUser;
use crate::models::Role;
use crate::session::SessionPhase;
use crate::store::Store;

/// An authenticated caller with its resolved role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

impl AuthUser {
    pub fn from_identity(user: IdentityUser, role: Role) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role,
        }
    }
}

/// Fetches the highest-priority role assigned to `user_id`.
///
/// Lookup errors fall back to `Customer`, which can demote an admin for the
/// rest of the session but never grants access.
pub async fn resolve_role(store: &dyn Store, user_id: Uuid) -> Role {
    match store.user_roles(user_id).await {
        Ok(roles) => Role::highest(&roles),
        Err(e) => {
            tracing::warn!(
                "Role lookup failed for user {}, defaulting to customer: {}",
                user_id,
                e
            );
            Role::Customer
        }
    }
}

/// Role lookups cached per user (5 minute TTL).
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn Store>,
    cache: Cache<Uuid, Role>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(300))
            .max_capacity(10_000)
            .build();
        Self { store, cache }
    }

    pub async fn role_for(&self, user_id: Uuid) -> Role {
        if let Some(role) = self.cache.get(&user_id).await {
            return role;
        }
        let role = resolve_role(self.store.as_ref(), user_id).await;
        self.cache.insert(user_id, role).await;
        role
    }

    pub async fn forget(&self, user_id: Uuid) {
        self.cache.invalidate(&user_id).await;
    }
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn guard_result(decision: GuardDecision) -> Result<(), AppError> {
    match decision {
        GuardDecision::Render => Ok(()),
        GuardDecision::RedirectToLogin => {
            Err(AppError::Unauthorized("Sign in required".to_string()))
        }
        GuardDecision::AccessDenied => Err(AppError::Forbidden(
            "Administrator role required".to_string(),
        )),
        GuardDecision::Loading => Err(AppError::InternalError(
            "Session still resolving".to_string(),
        )),
    }
}

async fn session_for(parts: &Parts, state: &AppState) -> Result<SessionPhase, AppError> {
    let Some(token) = bearer_token(&parts.headers) else {
        return Ok(SessionPhase::SignedOut);
    };
    let user = match state.identity.user_for_token(token).await {
        Ok(user) => user,
        Err(AppError::Unauthorized(_)) => return Ok(SessionPhase::SignedOut),
        Err(e) => return Err(e),
    };
    let role = state.roles.role_for(user.id).await;
    Ok(SessionPhase::SignedIn(AuthUser::from_identity(user, role)))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let phase = session_for(parts, state).await?;
        guard_result(guards::require_auth(&phase))?;
        match phase {
            SessionPhase::SignedIn(user) => Ok(user),
            _ => Err(AppError::Unauthorized("Sign in required".to_string())),
        }
    }
}

/// An authenticated caller whose resolved role is `Admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let phase = session_for(parts, state).await?;
        guard_result(guards::require_admin(&phase))?;
        match phase {
            SessionPhase::SignedIn(user) => Ok(AdminUser(user)),
            _ => Err(AppError::Unauthorized("Sign in required".to_string())),
        }
    }
}
