use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::CredentialError, AppState};

/// Request body for both endpoints. The password is wiped when the body drops.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Register ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user_id: String,
}

pub async fn register(State(state): State<AppState>, Json(body): Json<Credentials>) -> Response {
    match state
        .service
        .register(&body.username, body.password.as_bytes())
        .await
    {
        Ok(user_id) => {
            info!(username = %body.username, user_id = %user_id, "audit: user.register");
            Json(RegisterResponse {
                message: "User registered successfully",
                user_id,
            })
            .into_response()
        }
        Err(e) => {
            if matches!(e, CredentialError::DuplicateUser) {
                info!(username = %body.username, "audit: user.register.duplicate");
            }
            e.into_response()
        }
    }
}

// ── Login ─────────────────────────────────────────────────────────────────────

pub async fn login(State(state): State<AppState>, Json(body): Json<Credentials>) -> Response {
    match state
        .service
        .authenticate(&body.username, body.password.as_bytes())
        .await
    {
        Ok(true) => {
            info!(username = %body.username, "audit: user.login");
            Json(json!({"message": "Login successful"})).into_response()
        }
        Ok(false) => {
            info!(username = %body.username, "audit: user.login.rejected");
            CredentialError::InvalidCredentials.into_response()
        }
        Err(e) => e.into_response(),
    }
}
