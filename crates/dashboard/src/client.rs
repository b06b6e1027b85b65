//! Inventory API: the engine's view of the server.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header, redirect};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

use stockroom_core::{Product, ProductFields, ProductId, ProductPatch, Role, StoreId, UserId};

use crate::error::ApiError;

/// Product operations the synchronization engine issues.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Product>, ApiError>;

    async fn create(&self, fields: &ProductFields) -> Result<Product, ApiError>;

    async fn update(&self, id: ProductId, patch: &ProductPatch) -> Result<Product, ApiError>;

    async fn delete(&self, id: ProductId) -> Result<(), ApiError>;

    async fn adjust(&self, id: ProductId, delta: i32) -> Result<Product, ApiError>;
}

#[async_trait]
impl<T: InventoryApi + ?Sized> InventoryApi for Arc<T> {
    async fn list(&self) -> Result<Vec<Product>, ApiError> {
        (**self).list().await
    }

    async fn create(&self, fields: &ProductFields) -> Result<Product, ApiError> {
        (**self).create(fields).await
    }

    async fn update(&self, id: ProductId, patch: &ProductPatch) -> Result<Product, ApiError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: ProductId) -> Result<(), ApiError> {
        (**self).delete(id).await
    }

    async fn adjust(&self, id: ProductId, delta: i32) -> Result<Product, ApiError> {
        (**self).adjust(id, delta).await
    }
}

/// The signed-in identity as reported by `GET /session`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub store_id: StoreId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub user: SessionUser,
    pub csrf_token: String,
}

/// Self-service sign-up input.
#[derive(Debug, Clone, Serialize)]
pub struct SignUp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
}

/// Error bodies the server sends.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    errors: Vec<String>,
    alert: Option<String>,
}

#[derive(Serialize)]
struct ProductEnvelope<'a, T> {
    product: &'a T,
}

#[derive(Serialize)]
struct AdjustmentBody {
    delta: i32,
}

/// HTTP implementation of [`InventoryApi`].
///
/// Keeps the session cookie in its own cookie store and sends the
/// session's CSRF token on every mutating request. Redirects are not
/// followed so that sign-in and sign-out outcomes stay visible.
#[derive(Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: Url,
    csrf_token: Option<String>,
}

impl std::fmt::Debug for HttpInventoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInventoryClient")
            .field("base_url", &self.base_url.as_str())
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpInventoryClient {
    /// Create a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidUrl` for a malformed URL, or
    /// `ApiError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
            csrf_token: None,
        })
    }

    /// Sign in and pick up the session's CSRF token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthFailure` with the server's alert on bad
    /// credentials.
    #[instrument(skip(self, password))]
    pub async fn sign_in(
        &mut self,
        email: &str,
        password: &SecretString,
    ) -> Result<SessionInfo, ApiError> {
        let response = self
            .client
            .post(self.url("/session")?)
            .header(header::ACCEPT, "application/json")
            .form(&[("email", email), ("password", password.expose_secret())])
            .send()
            .await?;

        if response.status() != StatusCode::SEE_OTHER {
            return Err(error_from(response).await);
        }
        self.refresh_session().await
    }

    /// Register through self-service sign-up. The new identity is signed in.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` listing every violated field.
    #[instrument(skip_all)]
    pub async fn sign_up(&mut self, sign_up: &SignUp) -> Result<SessionInfo, ApiError> {
        let response = self
            .client
            .post(self.url("/registrations")?)
            .header(header::ACCEPT, "application/json")
            .json(sign_up)
            .send()
            .await?;

        if response.status() != StatusCode::SEE_OTHER {
            return Err(error_from(response).await);
        }
        self.refresh_session().await
    }

    /// Sign out. Succeeds whether or not a session was live.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    pub async fn sign_out(&mut self) -> Result<(), ApiError> {
        let response = self.client.delete(self.url("/session")?).send().await?;
        self.csrf_token = None;

        if response.status() == StatusCode::SEE_OTHER {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }

    /// Current identity and CSRF token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` without a live session.
    pub async fn session(&self) -> Result<SessionInfo, ApiError> {
        let request = self
            .client
            .get(self.url("/session")?)
            .header(header::ACCEPT, "application/json");
        send_json(request).await
    }

    /// Use an explicit CSRF token (e.g. one read from the products page).
    pub fn set_csrf_token(&mut self, token: impl Into<String>) {
        self.csrf_token = Some(token.into());
    }

    async fn refresh_session(&mut self) -> Result<SessionInfo, ApiError> {
        let info = self.session().await?;
        self.csrf_token = Some(info.csrf_token.clone());
        debug!(user_id = %info.user.id, "session established");
        Ok(info)
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    fn mutating(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match &self.csrf_token {
            Some(token) => request.header("x-csrf-token", token),
            None => request,
        }
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryClient {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<Product>, ApiError> {
        let request = self
            .client
            .get(self.url("/products")?)
            .header(header::ACCEPT, "application/json");
        send_json(request).await
    }

    #[instrument(skip_all)]
    async fn create(&self, fields: &ProductFields) -> Result<Product, ApiError> {
        let request = self
            .mutating(self.client.post(self.url("/products")?))
            .json(&ProductEnvelope { product: fields });
        send_json(request).await
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: ProductId, patch: &ProductPatch) -> Result<Product, ApiError> {
        let request = self
            .mutating(self.client.patch(self.url(&format!("/products/{id}"))?))
            .json(&ProductEnvelope { product: patch });
        send_json(request).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: ProductId) -> Result<(), ApiError> {
        let response = self
            .mutating(self.client.delete(self.url(&format!("/products/{id}"))?))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from(response).await)
        }
    }

    #[instrument(skip(self))]
    async fn adjust(&self, id: ProductId, delta: i32) -> Result<Product, ApiError> {
        let request = self
            .mutating(
                self.client
                    .post(self.url(&format!("/products/{id}/adjustments"))?),
            )
            .json(&AdjustmentBody { delta });
        send_json(request).await
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
    let response = request.send().await?;
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(error_from(response).await)
    }
}

/// Map a non-success response to an [`ApiError`].
async fn error_from(response: Response) -> ApiError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::SEE_OTHER => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        StatusCode::SERVICE_UNAVAILABLE => ApiError::Timeout,
        StatusCode::UNPROCESSABLE_ENTITY => {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            classify_unprocessable(body)
        }
        _ => ApiError::Server(status.as_u16()),
    }
}

fn classify_unprocessable(body: ErrorBody) -> ApiError {
    if !body.errors.is_empty() {
        ApiError::Validation(body.errors)
    } else if let Some(alert) = body.alert {
        ApiError::AuthFailure(alert)
    } else {
        ApiError::InvalidAuthenticityToken
    }
}
