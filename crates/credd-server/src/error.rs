use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username already exists")]
    DuplicateUser,

    /// Unknown username and wrong password are deliberately the same variant.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("store unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),
}

impl From<StoreError> for CredentialError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => Self::DuplicateUser,
            StoreError::Unavailable(e) => Self::StoreUnavailable(e),
        }
    }
}

impl IntoResponse for CredentialError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            Self::DuplicateUser => (StatusCode::BAD_REQUEST, "Username already exists"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid username or password"),
            Self::InvalidInput(msg) => (StatusCode::UNPROCESSABLE_ENTITY, *msg),
            Self::StoreUnavailable(e) => {
                error!(error = %format!("{e:#}"), "credential store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable",
                )
            }
            Self::Internal(e) => {
                error!(error = %format!("{e:#}"), "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (CredentialError::DuplicateUser, StatusCode::BAD_REQUEST),
            (CredentialError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                CredentialError::InvalidInput("Username must not be empty"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CredentialError::StoreUnavailable(anyhow::anyhow!("timed out")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CredentialError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn store_conflict_maps_to_duplicate() {
        assert!(matches!(
            CredentialError::from(StoreError::Conflict),
            CredentialError::DuplicateUser
        ));
    }
}
