//! Self-service sign-up.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use stockroom_core::StoreId;

use crate::error::{AppError, set_sentry_user};
use crate::middleware::wants_json;
use crate::models::Store;
use crate::services::{AuthError, Registration, session};
use crate::state::AppState;

/// Registration form data.
///
/// A submitted `role` is not a field here and is dropped during
/// deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub store_id: Option<StoreIdInput>,
}

/// Forms send the store id as text; JSON clients may send a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StoreIdInput {
    Number(i64),
    Text(String),
}

impl RegistrationForm {
    /// An empty or unparseable store id counts as no store.
    fn store_id(&self) -> Option<StoreId> {
        match self.store_id.as_ref()? {
            StoreIdInput::Number(id) => i32::try_from(*id).ok().map(StoreId::new),
            StoreIdInput::Text(id) => Some(id.trim())
                .filter(|id| !id.is_empty())
                .and_then(|id| id.parse().ok()),
        }
    }
}

/// Sign-up page template.
#[derive(Template, WebTemplate)]
#[template(path = "registrations/new.html")]
pub struct RegistrationTemplate {
    pub stores: Vec<Store>,
    pub errors: Vec<String>,
    pub name: String,
    pub email: String,
    pub store_id: Option<StoreId>,
}

impl RegistrationTemplate {
    fn is_selected(&self, id: &StoreId) -> bool {
        self.store_id == Some(*id)
    }
}

/// Display the sign-up page.
pub async fn new(State(state): State<AppState>) -> Result<RegistrationTemplate, AppError> {
    Ok(RegistrationTemplate {
        stores: state.stores().list().await?,
        errors: Vec::new(),
        name: String::new(),
        email: String::new(),
        store_id: None,
    })
}

/// Handle sign-up. The new identity is always an employee and is signed in.
#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    super::JsonOrForm(form): super::JsonOrForm<RegistrationForm>,
) -> Result<Response, AppError> {
    let store_id = form.store_id();
    let registration = Registration {
        name: form.name.clone(),
        email: form.email.clone(),
        password: form.password,
        password_confirmation: form.password_confirmation,
        store_id,
    };

    match state.auth().register(registration).await {
        Ok(identity) => {
            session::create(&session, &identity).await?;
            set_sentry_user(identity.id.as_i32(), Some(identity.email.as_str()));
            Ok(Redirect::to("/products").into_response())
        }
        Err(AuthError::Invalid(errors)) if !wants_json(&headers) => {
            let page = RegistrationTemplate {
                stores: state.stores().list().await?,
                errors: errors.full_messages(),
                name: form.name.unwrap_or_default(),
                email: form.email,
                store_id,
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response())
        }
        Err(e) => Err(e.into()),
    }
}
