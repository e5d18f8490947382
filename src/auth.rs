use axum::{
    extract::{FromRef, FromRequestParts},
    http::{Uri, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    access::Permission,
    config::{AppConfig, Env},
    error::AppError,
    repository::{RepoError, RepositoryState},
};

/// Header honoured in `Env::Local` to act as a user without minting a token.
pub const LOCAL_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of the HS256 bearer token. Tokens are minted by the external login flow
/// with the same `JWT_SECRET`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID in the `users` table.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of a request, with the permission codenames granted to it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub is_superuser: bool,
    pub permissions: HashSet<String>,
}

impl AuthUser {
    /// Superusers implicitly hold every permission.
    pub fn has_perm(&self, permission: &Permission) -> bool {
        self.is_superuser || self.permissions.contains(permission.as_str())
    }
}

/// login_redirect
///
/// Builds `{login_url}?next={path}` so the login flow can send the user back.
pub fn login_redirect(login_url: &str, uri: &Uri) -> String {
    let next = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("next", next)
        .finish();
    let separator = if login_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", login_url, separator, query)
}

/// Loads the user and its grants; inactive or unknown users resolve to `None`.
async fn resolve(repo: &RepositoryState, user_id: Uuid) -> Result<Option<AuthUser>, RepoError> {
    let Some(user) = repo.get_user(user_id).await? else {
        return Ok(None);
    };
    if !user.is_active {
        tracing::debug!(user_id = %user.id, "inactive user rejected");
        return Ok(None);
    }
    let permissions = repo.get_user_permissions(user.id).await?.into_iter().collect();
    Ok(Some(AuthUser {
        id: user.id,
        username: user.username,
        is_superuser: user.is_superuser,
        permissions,
    }))
}

fn bearer_subject(parts: &Parts, config: &AppConfig) -> Option<Uuid> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?
        .strip_prefix("Bearer ")?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Some(data.claims.sub),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("expired bearer token"),
                kind => tracing::debug!(?kind, "rejected bearer token"),
            }
            None
        }
    }
}

/// AuthUser Extractor
///
/// Resolution order:
/// 1. Local bypass: in `Env::Local`, a valid UUID in `x-user-id` naming an active user.
/// 2. Bearer JWT: signature and expiry are checked, then the subject is looked up.
///
/// Rejection: `AppError::AuthenticationRequired` carrying the login redirect for any
/// identity failure, `AppError::Storage` when the user lookup itself fails.
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

        if config.env == Env::Local {
            let bypass = parts
                .headers
                .get(LOCAL_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());
            if let Some(user_id) = bypass {
                if let Some(user) = resolve(&repo, user_id).await? {
                    return Ok(user);
                }
            }
        }

        let unauthenticated = || AppError::AuthenticationRequired {
            location: login_redirect(&config.login_url, &parts.uri),
        };

        let Some(user_id) = bearer_subject(parts, &config) else {
            return Err(unauthenticated());
        };

        // The user may have been deleted or deactivated after the token was issued.
        resolve(&repo, user_id).await?.ok_or_else(unauthenticated)
    }
}
