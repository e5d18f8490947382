use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::{collections::HashMap, fmt};

use crate::{
    AppState,
    auth::{AuthUser, login_redirect},
    config::AppConfig,
    error::AppError,
    models::Entity,
    repository::RepositoryState,
};

/// Django-style application label prefixed to every permission codename.
pub const APP_LABEL: &str = "courseinfo";

/// Action
///
/// The four grantable capabilities per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
        }
    }
}

/// Operation
///
/// The controller operations a route can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Detail,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::List,
        Operation::Detail,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    /// The grant an operation is gated on: reads need `view`, writes their own action.
    pub fn action(self) -> Action {
        match self {
            Operation::List | Operation::Detail => Action::View,
            Operation::Create => Action::Add,
            Operation::Update => Action::Change,
            Operation::Delete => Action::Delete,
        }
    }
}

/// Permission
///
/// A grant codename such as `courseinfo.view_student`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission(String);

impl Permission {
    pub fn new(entity: Entity, action: Action) -> Self {
        Permission(format!(
            "{}.{}_{}",
            APP_LABEL,
            action.as_str(),
            entity.slug()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    AuthenticationRequired,
    /// `None` when the (entity, operation) pair has no table entry at all.
    PermissionDenied(Option<Permission>),
}

/// AccessPolicy
///
/// Declarative `(entity, operation) → required permission` table consulted before
/// every controller operation. Pairs missing from the table are denied.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    table: HashMap<(Entity, Operation), Permission>,
}

impl AccessPolicy {
    /// Every operation on every entity requires its corresponding grant.
    pub fn standard() -> Self {
        let table = Entity::ALL
            .iter()
            .flat_map(|&entity| {
                Operation::ALL.iter().map(move |&operation| {
                    ((entity, operation), Permission::new(entity, operation.action()))
                })
            })
            .collect();
        Self { table }
    }

    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, entity: Entity, operation: Operation, permission: Permission) -> Self {
        self.table.insert((entity, operation), permission);
        self
    }

    pub fn required(&self, entity: Entity, operation: Operation) -> Option<&Permission> {
        self.table.get(&(entity, operation))
    }

    /// check
    ///
    /// Anonymous callers are always denied with `AuthenticationRequired`; authenticated
    /// callers need the mapped grant (superusers hold every grant).
    pub fn check(&self, caller: Option<&AuthUser>, entity: Entity, operation: Operation) -> Decision {
        let Some(user) = caller else {
            return Decision::Deny(Denial::AuthenticationRequired);
        };
        match self.required(entity, operation) {
            Some(permission) if user.has_perm(permission) => Decision::Allow,
            Some(permission) => Decision::Deny(Denial::PermissionDenied(Some(permission.clone()))),
            None => Decision::Deny(Denial::PermissionDenied(None)),
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

// --- Route Guard ---

/// Gate
///
/// Per-route middleware state: the shared application state plus the
/// (entity, operation) pair the route dispatches to.
#[derive(Clone)]
pub struct Gate {
    state: AppState,
    entity: Entity,
    operation: Operation,
}

impl Gate {
    pub fn new(state: AppState, entity: Entity, operation: Operation) -> Self {
        Self {
            state,
            entity,
            operation,
        }
    }
}

impl FromRef<Gate> for RepositoryState {
    fn from_ref(gate: &Gate) -> RepositoryState {
        gate.state.repo.clone()
    }
}

impl FromRef<Gate> for AppConfig {
    fn from_ref(gate: &Gate) -> AppConfig {
        gate.state.config.clone()
    }
}

/// enforce
///
/// Resolves the caller, asks the `AccessPolicy`, and only then lets the request reach
/// the handler. The resolved `AuthUser` is stored in the request extensions for handlers.
pub async fn enforce(
    State(gate): State<Gate>,
    caller: Result<AuthUser, AppError>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = match caller {
        Ok(user) => Some(user),
        Err(AppError::AuthenticationRequired { .. }) => None,
        Err(other) => return other.into_response(),
    };

    match gate
        .state
        .policy
        .check(caller.as_ref(), gate.entity, gate.operation)
    {
        Decision::Allow => {
            if let Some(user) = caller {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        Decision::Deny(Denial::AuthenticationRequired) => AppError::AuthenticationRequired {
            location: login_redirect(&gate.state.config.login_url, request.uri()),
        }
        .into_response(),
        Decision::Deny(Denial::PermissionDenied(permission)) => {
            let permission = permission
                .map(|p| p.to_string())
                .unwrap_or_else(|| format!("{}.{:?}", gate.entity, gate.operation));
            tracing::warn!(
                entity = %gate.entity,
                operation = ?gate.operation,
                user = caller.as_ref().map(|u| u.username.as_str()).unwrap_or("-"),
                %permission,
                "permission denied"
            );
            AppError::PermissionDenied { permission }.into_response()
        }
    }
}
