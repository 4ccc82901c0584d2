//! Sign-in, refresh and session endpoints.
//!
//! Token failures all map to `401` with no detail; storage failures map to `503`.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::session::{ClaimSet, Credentials, SessionError, SessionService, TokenPair};

pub(crate) const REFRESH_COOKIE_NAME: &str = "refreshToken";

const INCORRECT_CREDENTIALS: &str = "Incorrect login or password";

#[derive(ToSchema, Deserialize)]
pub struct SignInRequest {
    email: String,
    password: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in, refresh token also set as cookie", body = TokenPair),
        (status = 400, description = "Missing payload or blank login"),
        (status = 401, description = "Incorrect login or password"),
        (status = 503, description = "Session storage unavailable")
    ),
    tag = "auth"
)]
pub async fn sign_in(
    service: Extension<Arc<SessionService>>,
    payload: Option<Json<SignInRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    // Email or login, matched as stored.
    let login = request.email.trim();
    if login.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing login".to_string()).into_response();
    }

    let credentials = Credentials::new(login, SecretString::from(request.password));
    match service.sign_in(&credentials).await {
        Ok(pair) => token_pair_response(&service, pair),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body(
        content = String,
        description = "Refresh token, used when the refreshToken cookie is absent",
        content_type = "text/plain"
    ),
    responses(
        (status = 200, description = "Token pair rotated, refresh token also set as cookie", body = TokenPair),
        (status = 401, description = "Refresh token missing, invalid, expired or superseded"),
        (status = 503, description = "Session storage unavailable")
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    service: Extension<Arc<SessionService>>,
    body: String,
) -> impl IntoResponse {
    let token = extract_refresh_cookie(&headers).or_else(|| {
        let trimmed = body.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    let Some(token) = token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match service.refresh(&token).await {
        Ok(pair) => token_pair_response(&service, pair),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Access token is valid", body = ClaimSet),
        (status = 204, description = "No access token presented"),
        (status = 401, description = "Access token is invalid or expired")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    service: Extension<Arc<SessionService>>,
) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    match service.authenticate(&token) {
        Ok(claims) => (StatusCode::OK, Json(claims)).into_response(),
        Err(err) => error_response(&err),
    }
}

fn token_pair_response(service: &SessionService, pair: TokenPair) -> Response {
    let mut headers = HeaderMap::new();
    match refresh_cookie(&pair.refresh_token, service.refresh_token_lifetime().as_secs()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build refresh token cookie: {err}"),
    }
    (StatusCode::OK, headers, Json(pair)).into_response()
}

fn error_response(err: &SessionError) -> Response {
    match err {
        SessionError::UnsuccessfulSignIn => {
            (StatusCode::UNAUTHORIZED, INCORRECT_CREDENTIALS.to_string()).into_response()
        }
        SessionError::Token(_) | SessionError::StaleRefreshToken => {
            debug!("Rejected token: {err}");
            StatusCode::UNAUTHORIZED.into_response()
        }
        SessionError::Storage(_) => {
            error!("{err}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Build an `HttpOnly` cookie holding the refresh token.
fn refresh_cookie(token: &str, max_age_seconds: u64) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}"
    ))
}

fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == REFRESH_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
