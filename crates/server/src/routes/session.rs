//! Sign-in and sign-out.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use crate::error::{AUTH_FAILURE_ALERT, AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, wants_json};
use crate::services::{AuthError, session};
use crate::state::AppState;

/// Sign-in form data.
#[derive(Debug, Deserialize)]
pub struct SignInForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Sign-in page template.
#[derive(Template, WebTemplate)]
#[template(path = "session/new.html")]
pub struct SignInTemplate {
    pub alert: Option<&'static str>,
    pub email: String,
}

/// Display the sign-in page.
pub async fn new() -> impl IntoResponse {
    SignInTemplate {
        alert: None,
        email: String::new(),
    }
}

/// Handle sign-in.
///
/// Success rotates the session id and redirects to the products page.
/// Failure answers 422 with the generic alert, as JSON or as the
/// re-rendered page.
#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    super::JsonOrForm(form): super::JsonOrForm<SignInForm>,
) -> Result<Response, AppError> {
    match state.auth().verify(&form.email, &form.password).await {
        Ok(identity) => {
            session::create(&session, &identity).await?;
            set_sentry_user(identity.id.as_i32(), Some(identity.email.as_str()));
            tracing::info!(user_id = %identity.id, store_id = %identity.store_id, "signed in");
            Ok(Redirect::to("/products").into_response())
        }
        Err(AuthError::InvalidCredentials) => {
            tracing::info!("sign-in rejected");
            if wants_json(&headers) {
                return Err(AppError::AuthFailure);
            }
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                SignInTemplate {
                    alert: Some(AUTH_FAILURE_ALERT),
                    email: form.email,
                },
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// The signed-in identity and the session's forgery protection token.
pub async fn show(
    RequireAuth(identity): RequireAuth,
    session: Session,
) -> Result<Json<serde_json::Value>, AppError> {
    let csrf_token = session::csrf_token(&session)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(json!({
        "user": identity,
        "csrf_token": csrf_token.as_str(),
    })))
}

/// Sign out. Always succeeds, even without a live session.
pub async fn destroy(session: Session) -> Result<Redirect, AppError> {
    session::destroy(&session).await?;
    clear_sentry_user();
    tracing::info!("signed out");
    Ok(Redirect::to("/session/new"))
}
