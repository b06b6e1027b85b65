//! Forgery protection for mutating requests.
//!
//! A mutating request must carry the token bound to its session, either in
//! the `X-CSRF-Token` header or as an `authenticity_token` form field.
//! Anonymous requests are rejected as unauthenticated before the token is
//! looked at.

use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use super::auth::{AuthRejection, CSRF_HEADER};
use crate::error::AppError;
use crate::services::session;

/// Form field carrying the token on HTML form posts.
pub const AUTHENTICITY_TOKEN_FIELD: &str = "authenticity_token";

/// Largest form body buffered while looking for the token.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// Route layer that verifies the forgery protection token.
///
/// Safe methods pass through untouched.
pub async fn verify_authenticity_token(request: Request, next: Next) -> Response {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();

    let Some(session) = parts.extensions.get::<Session>().cloned() else {
        return AppError::Internal("session layer missing".to_string()).into_response();
    };

    let expected = match session::csrf_token(&session).await {
        Ok(Some(token)) => token,
        Ok(None) => return AuthRejection::for_headers(&parts.headers).into_response(),
        Err(e) => return AppError::from(e).into_response(),
    };

    let (submitted, body) = match header_token(&parts.headers) {
        Some(token) => (Some(token), body),
        None if is_form(&parts.headers) => {
            let Ok(bytes) = to_bytes(body, MAX_FORM_BYTES).await else {
                return AppError::InvalidAuthenticityToken.into_response();
            };
            let token = url::form_urlencoded::parse(&bytes)
                .find(|(key, _)| key == AUTHENTICITY_TOKEN_FIELD)
                .map(|(_, value)| value.into_owned());
            (token, Body::from(bytes))
        }
        None => (None, body),
    };

    match submitted {
        Some(token) if expected.matches(&token) => {
            next.run(Request::from_parts(parts, body)).await
        }
        _ => AppError::InvalidAuthenticityToken.into_response(),
    }
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}
