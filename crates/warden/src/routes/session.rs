//! Session check and revocation endpoints (called by the front door).

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

use crate::state::AppState;

/// Check the session cookie
///
/// Returns:
/// - 204: Valid session
/// - 401: Missing, unknown, or expired session
///
/// Designed for Nginx `auth_request` style subrequests.
pub async fn check_session(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let token = cookie_value(&headers, &state.config.session.cookie_name);

    if state.sessions.validate(&state.store, token).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::UNAUTHORIZED
    }
}

/// Revoke the session cookie's session and clear the cookie
pub async fn revoke_session(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let name = &state.config.session.cookie_name;
    if let Some(token) = cookie_value(&headers, name) {
        state.sessions.revoke(&state.store, token).await;
    }

    let cleared = format!("{}=; HttpOnly; SameSite=Strict; Max-Age=0; Path=/", name);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cleared)])
}

/// Value of cookie `name` across all `Cookie` headers
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
