use std::collections::BTreeSet;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    repository::RepositoryState,
};

/// Named permissions checked directly by the policies.
pub mod permissions {
    pub const VIEW_POSTS: &str = "view posts";
    pub const CREATE_POSTS: &str = "create posts";
}

/// Claims
///
/// Payload expected inside the HS256 JSON Web Token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID.
    pub sub: Uuid,
    /// Expiration Time (exp). Always validated.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// Role
///
/// The role names the policies know about. Role membership is matched on the exact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Editor,
    Author,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Editor => "Editor",
            Role::Author => "Author",
        }
    }
}

/// AuthUser
///
/// The acting user of one request: identity plus the role and permission sets resolved
/// once by the extractor. Every policy takes this explicitly; nothing reads it from ambient state.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl AuthUser {
    pub fn new<R, P>(id: Uuid, roles: R, permissions: P) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            id,
            roles: roles.into_iter().map(Into::into).collect(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role.as_str())
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    /// True when the user holds at least one role of any name.
    pub fn has_roles(&self) -> bool {
        !self.roles.is_empty()
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    /// Ownership check: the user's id equals the resource's owning-user id.
    pub fn owns(&self, owner_id: Uuid) -> bool {
        self.id == owner_id
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Local Bypass: in `Env::Local` only, an `x-user-id` header naming an existing user.
/// 2. Token Validation: `Authorization: Bearer <jwt>` decoded with the configured secret.
/// 3. DB Lookup: the user must still exist.
/// 4. Capability Resolution: roles and permissions are loaded once for the request.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let mut bypassed = None;
        if let Some(id) = local_bypass(parts, &config) {
            bypassed = repo.get_user(id).await;
        }

        let user = match bypassed {
            Some(user) => user,
            None => {
                let user_id = bearer_subject(parts, &config)?;
                // Rejects tokens for users deleted after issue.
                repo.get_user(user_id).await.ok_or(AppError::Unauthorized)?
            }
        };

        let roles = repo.resolve_roles(user.id).await;
        let permissions = repo.resolve_permissions(user.id).await;

        tracing::debug!(user_id = %user.id, ?roles, "resolved acting user");

        Ok(AuthUser {
            id: user.id,
            roles,
            permissions,
        })
    }
}

fn local_bypass(parts: &Parts, config: &AppConfig) -> Option<Uuid> {
    if config.env != Env::Local {
        return None;
    }
    parts
        .headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn bearer_subject(parts: &Parts, config: &AppConfig) -> Result<Uuid, AppError> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims.sub)
        .map_err(|e| {
            tracing::debug!("rejected bearer token: {:?}", e.kind());
            AppError::Unauthorized
        })
}
