//! Stockroom inventory server library.
//!
//! Multi-tenant product inventory behind session authentication. Every
//! product operation goes through a [`scope::StoreScope`] derived from the
//! signed-in identity, and stock adjustments serialize on a per-product
//! row lock.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod scope;
pub mod services;
pub mod state;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::middleware::{create_session_layer, request_id_middleware};
use crate::state::AppState;

/// Build the full application router over `session_store`.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .layer(session_layer)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint. 503 when storage is unreachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.backend().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, backend = state.backend().name(), "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use stockroom_core::{ProductFields, Role};
    use tower::ServiceExt;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::config::ServerConfig;
    use crate::db::{Backend, MemoryStorage, StoreRepository};
    use crate::models::NewStore;
    use crate::services::NewAccount;

    const PASSWORD: &str = "correct horse battery";

    async fn seeded_app() -> (Router, AppState) {
        let state = AppState::new(
            ServerConfig::default(),
            Backend::Memory(MemoryStorage::new()),
        );
        for (name, slug, email) in [
            ("Shop", "shop", "admin@shop.com"),
            ("Other", "other", "admin@other.com"),
        ] {
            let store = state
                .stores()
                .create(NewStore::new(name, slug).unwrap())
                .await
                .unwrap();
            let identity = state
                .auth()
                .create_identity(NewAccount {
                    store_id: store.id,
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                    name: None,
                    role: Role::Admin,
                })
                .await
                .unwrap();
            state
                .scope_for(&identity)
                .products()
                .create(ProductFields {
                    name: format!("{name} widget"),
                    sku: "W-1".to_string(),
                    reorder_point: 1,
                    on_hand: 5,
                    max: 10,
                })
                .await
                .unwrap();
        }
        (app(state.clone(), MemoryStore::default()), state)
    }

    async fn sign_in(app: &Router, email: &str) -> String {
        let response = app
            .clone()
            .oneshot(
                Request::post("/session")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!(
                        "email={}&password=correct+horse+battery",
                        email.replace('@', "%40")
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/products");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        cookie.split(';').next().unwrap().to_string()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = seeded_app().await;
        for path in ["/health", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_anonymous_products_redirects_or_401s() {
        let (app, _) = seeded_app().await;
        let html = app
            .clone()
            .oneshot(Request::get("/products").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(html.status(), StatusCode::SEE_OTHER);

        let api = app
            .oneshot(
                Request::get("/products")
                    .header(header::ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_mixed_case_login_sees_only_own_store() {
        let (app, _) = seeded_app().await;
        let cookie = sign_in(&app, "Admin@Shop.com").await;

        let response = app
            .oneshot(
                Request::get("/products")
                    .header(header::ACCEPT, "application/json")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let products = json_body(response).await;
        let names: Vec<_> = products
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Shop widget"]);
    }

    #[tokio::test]
    async fn test_bad_credentials_json_alert() {
        let (app, _) = seeded_app().await;
        let response = app
            .oneshot(
                Request::post("/session")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email": "admin@shop.com", "password": "wrong"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await["alert"],
            "Invalid email or password."
        );
    }

    #[tokio::test]
    async fn test_products_page_embeds_csrf_token() {
        let (app, _) = seeded_app().await;
        let cookie = sign_in(&app, "admin@shop.com").await;

        let session = json_body(
            app.clone()
                .oneshot(
                    Request::get("/session")
                        .header(header::COOKIE, &cookie)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        let token = session["csrf_token"].as_str().unwrap().to_string();
        assert_eq!(session["user"]["email"], "admin@shop.com");

        let page = app
            .oneshot(
                Request::get("/products")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(page.status(), StatusCode::OK);
        let html = String::from_utf8(
            to_bytes(page.into_body(), usize::MAX)
                .await
                .unwrap()
                .to_vec(),
        )
        .unwrap();
        assert!(html.contains(&format!(r#"<meta name="csrf-token" content="{token}">"#)));
        assert!(html.contains("Shop widget"));
    }

    #[tokio::test]
    async fn test_cross_store_patch_is_not_found() {
        let (app, state) = seeded_app().await;
        let cookie = sign_in(&app, "admin@shop.com").await;

        let other = state.stores().find_by_slug("other").await.unwrap().unwrap();
        let foreign = state
            .identities()
            .find_credentials(&stockroom_core::Email::parse("admin@other.com").unwrap())
            .await
            .unwrap()
            .unwrap()
            .0;
        assert_eq!(foreign.store_id, other.id);
        let foreign_product = state.scope_for(&foreign).products().list().await.unwrap()[0].clone();

        let session = json_body(
            app.clone()
                .oneshot(
                    Request::get("/session")
                        .header(header::COOKIE, &cookie)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        let token = session["csrf_token"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::patch(format!("/products/{}", foreign_product.id))
                    .header(header::COOKIE, &cookie)
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-csrf-token", token)
                    .body(Body::from(r#"{"product": {"name": "Stolen"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let unchanged = state.scope_for(&foreign).products().list().await.unwrap();
        assert_eq!(unchanged[0].name, "Other widget");
    }
}
