//! Challenge issuance and solution endpoints.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::state::AppState;
use warden_common::{Challenge, ValidationResult, VerifyError, constants::SUCCESS_REDIRECT};

/// Issue a new proof-of-work challenge
pub async fn get_challenge(State(state): State<AppState>) -> Result<Json<Challenge>, StatusCode> {
    state
        .challenge_generator
        .generate(&state.store, state.difficulty)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to issue challenge");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    challenge_id: String,
    solution: Solution,
}

/// Browsers send the counter either as a number or a string
#[derive(Deserialize)]
#[serde(untagged)]
enum Solution {
    Text(String),
    Number(u64),
}

impl Solution {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Verify a solution and grant a session
pub async fn validate(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected validation body");
            return reject(VerifyError::Malformed);
        }
    };
    let solution = request.solution.into_string();

    if let Err(e) = state
        .challenge_verifier
        .verify(&state.store, &request.challenge_id, &solution)
        .await
    {
        tracing::debug!(challenge_id = %request.challenge_id, outcome = ?e, "Validation failed");
        return reject(e);
    }

    let session = match state.sessions.create(&state.store).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create session");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValidationResult::rejected("Internal error")),
            )
                .into_response();
        }
    };

    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Max-Age={}; Path=/",
        state.config.session.cookie_name, session.token, state.config.session.ttl_secs
    );

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ValidationResult::accepted(SUCCESS_REDIRECT)),
    )
        .into_response()
}

fn reject(err: VerifyError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(ValidationResult::rejected(err.to_string()))).into_response()
}
