//! Product route handlers.
//!
//! Every handler reaches products through the caller's [`StoreScope`], so a
//! product id from another store answers 404 exactly like a missing one.
//!
//! [`StoreScope`]: crate::scope::StoreScope

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use stockroom_core::{Product, ProductFields, ProductId, ProductPatch};

use super::{JsonOrForm, ProductBody};
use crate::error::AppError;
use crate::middleware::{RequireAuth, Scoped, wants_json};
use crate::services::session;
use crate::state::AppState;

/// Stock adjustment body.
#[derive(Debug, Deserialize)]
pub struct Adjustment {
    pub delta: i32,
}

/// Products page. The list is embedded as JSON for the dashboard script.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsTemplate {
    pub email: String,
    pub csrf_token: String,
    pub products: Vec<Product>,
    pub products_json: String,
    pub low_stock_count: usize,
}

/// Serialize for embedding inside a `<script>` element.
fn script_safe_json(products: &[Product]) -> Result<String, AppError> {
    let json = serde_json::to_string(products)
        .map_err(|e| AppError::Internal(format!("serialize products: {e}")))?;
    Ok(json.replace("</", "<\\/"))
}

/// List the caller's products, as JSON or as the dashboard page.
#[tracing::instrument(skip_all, fields(store_id = %identity.store_id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let products = state.scope_for(&identity).products().list().await?;

    if wants_json(&headers) {
        return Ok(Json(products).into_response());
    }

    let csrf_token = session::csrf_token(&session)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(ProductsTemplate {
        email: identity.email.to_string(),
        csrf_token: csrf_token.as_str().to_owned(),
        products_json: script_safe_json(&products)?,
        low_stock_count: products.iter().filter(|p| p.is_low_stock()).count(),
        products,
    }
    .into_response())
}

/// Create a product in the caller's store.
#[tracing::instrument(skip_all, fields(store_id = %scope.store_id()))]
pub async fn create(
    Scoped(scope): Scoped,
    ProductBody(fields): ProductBody<ProductFields>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = scope.products().create(fields).await?;
    tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// Partially update a product. Unspecified fields keep their stored value.
#[tracing::instrument(skip_all, fields(store_id = %scope.store_id(), product_id = %id))]
pub async fn update(
    Scoped(scope): Scoped,
    Path(id): Path<ProductId>,
    ProductBody(patch): ProductBody<ProductPatch>,
) -> Result<Json<Product>, AppError> {
    let product = scope.products().update(id, &patch).await?;
    Ok(Json(product))
}

/// Delete a product.
#[tracing::instrument(skip_all, fields(store_id = %scope.store_id(), product_id = %id))]
pub async fn destroy(
    Scoped(scope): Scoped,
    Path(id): Path<ProductId>,
) -> Result<StatusCode, AppError> {
    scope.products().delete(id).await?;
    tracing::info!("product deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Adjust on-hand stock by a signed delta.
#[tracing::instrument(skip_all, fields(store_id = %scope.store_id(), product_id = %id))]
pub async fn adjust(
    Scoped(scope): Scoped,
    Path(id): Path<ProductId>,
    JsonOrForm(adjustment): JsonOrForm<Adjustment>,
) -> Result<Json<Product>, AppError> {
    let product = scope
        .products()
        .adjust_on_hand(id, adjustment.delta)
        .await?;
    tracing::debug!(delta = adjustment.delta, on_hand = product.on_hand, "stock adjusted");
    Ok(Json(product))
}
