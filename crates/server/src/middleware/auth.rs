//! Authentication extractors.
//!
//! The session only stores a user id. The identity is re-read on every
//! request, so deleting a user (or its store) ends their access at once.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::error::{AppError, set_sentry_user};
use crate::models::Identity;
use crate::scope::StoreScope;
use crate::services::session;
use crate::state::AppState;

/// Header carrying the forgery protection token on scripted requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Sign-in page anonymous HTML requests are sent to.
pub const SIGN_IN_PATH: &str = "/session/new";

/// Extractor that requires a live session.
///
/// Anonymous HTML requests are redirected to the sign-in page; scripted
/// requests get 401.
pub struct RequireAuth(pub Identity);

/// Extractor for the caller's store scope. Implies [`RequireAuth`].
pub struct Scoped(pub StoreScope);

/// Rejection for requests without a live session.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to the sign-in page (HTML requests).
    RedirectToLogin,
    /// Unauthorized response (scripted requests).
    Unauthorized,
    /// The session store failed.
    Failed(AppError),
}

impl AuthRejection {
    /// Pick the rejection style from the request headers.
    #[must_use]
    pub fn for_headers(headers: &HeaderMap) -> Self {
        if wants_json(headers) {
            Self::Unauthorized
        } else {
            Self::RedirectToLogin
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(SIGN_IN_PATH).into_response(),
            Self::Unauthorized => AppError::Unauthorized.into_response(),
            Self::Failed(err) => err.into_response(),
        }
    }
}

/// Whether the client expects JSON rather than a rendered page.
#[must_use]
pub fn wants_json(headers: &HeaderMap) -> bool {
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));
    let sends_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    accepts_json || sends_json || headers.contains_key(CSRF_HEADER)
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| {
                AuthRejection::Failed(AppError::Internal("session layer missing".to_string()))
            })?;

        let user_id = session::resolve(&session)
            .await
            .map_err(|e| AuthRejection::Failed(e.into()))?
            .ok_or_else(|| AuthRejection::for_headers(&parts.headers))?;

        let Some(identity) = state
            .identities()
            .find(user_id)
            .await
            .map_err(|e| AuthRejection::Failed(e.into()))?
        else {
            tracing::info!(user_id = %user_id, "session refers to a deleted identity");
            return Err(AuthRejection::for_headers(&parts.headers));
        };

        set_sentry_user(identity.id.as_i32(), Some(identity.email.as_str()));
        Ok(Self(identity))
    }
}

impl FromRequestParts<AppState> for Scoped {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(identity) = RequireAuth::from_request_parts(parts, state).await?;
        Ok(Self(state.scope_for(&identity)))
    }
}
