//! Body extractors shared by the route handlers.

use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use stockroom_core::ValidationErrors;

use crate::error::AppError;

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Accepts a JSON body or a urlencoded form, chosen by `Content-Type`.
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(req.headers()) {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        }
    }
}

/// JSON product bodies may be wrapped as `{"product": {...}}` or sent flat.
///
/// A `product` key commits to the wrapped form, so a malformed wrapped body
/// is reported instead of being read as an empty flat one.
fn unwrap_envelope<T: DeserializeOwned>(body: Value) -> Result<T, ValidationErrors> {
    let inner = match body {
        Value::Object(mut map) => map.remove("product").unwrap_or(Value::Object(map)),
        other => other,
    };
    serde_json::from_value(inner)
        .map_err(|err| ValidationErrors::single("product", format!("is malformed: {err}")))
}

/// Product attributes from a JSON (optionally enveloped) or form body.
pub struct ProductBody<T>(pub T);

impl<S, T> FromRequest<S> for ProductBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(req.headers()) {
            let Json(body) = Json::<Value>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            unwrap_envelope(body)
                .map(Self)
                .map_err(|errors| AppError::Validation(errors).into_response())
        } else {
            // Forms are flat only.
            let JsonOrForm(value) = JsonOrForm::<T>::from_request(req, state).await?;
            Ok(Self(value))
        }
    }
}
