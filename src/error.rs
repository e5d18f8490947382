use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    models::{Entity, Id},
    repository::RepoError,
    validation::FieldErrors,
};

/// AppError
///
/// The failure taxonomy of every catalog operation. Each variant is turned into a
/// user-visible response at the operation boundary; none of them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No resolvable identity. Answered with a redirect to the login flow.
    #[error("authentication required")]
    AuthenticationRequired { location: String },

    #[error("missing permission `{permission}`")]
    PermissionDenied { permission: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Id },

    /// `form` is the serialized `FormView` to redisplay, errors included.
    #[error("{entity} form has {} invalid field(s)", .errors.len())]
    ValidationFailure {
        entity: Entity,
        errors: FieldErrors,
        form: Value,
    },

    #[error("{entity} {id} still has {} dependent(s)", .dependents.len())]
    DependentsExist {
        entity: Entity,
        id: Id,
        object: Value,
        dependents: Vec<Value>,
    },

    #[error(transparent)]
    Storage(#[from] RepoError),
}

/// Serializes a payload into an error body. Catalog types always serialize, so the
/// `Null` fallback is never observed in practice.
pub fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::AuthenticationRequired { location } => {
                Redirect::to(&location).into_response()
            }
            AppError::PermissionDenied { permission } => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "permission_denied", "permission": permission })),
            )
                .into_response(),
            AppError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not_found", "entity": entity, "id": id })),
            )
                .into_response(),
            AppError::ValidationFailure { form, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(form)).into_response()
            }
            AppError::DependentsExist {
                entity,
                id,
                object,
                dependents,
            } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "dependents_exist",
                    "entity": entity,
                    "id": id,
                    "object": object,
                    "dependents": dependents,
                })),
            )
                .into_response(),
            AppError::Storage(err) => {
                // The detail stays in the logs; the caller only learns that it failed.
                tracing::error!(error = ?err, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal" })),
                )
                    .into_response()
            }
        }
    }
}
