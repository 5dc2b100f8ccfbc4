//! Route table and the governor chain guarding each group.
//!
//! | Group            | Chain                          |
//! |------------------|--------------------------------|
//! | `/health`        | standard (health paths skip)   |
//! | `/api/...`       | graduated detector, standard   |
//! | `/api/auth/...`  | auth                           |
//! | `/api/public/...`| public                         |
//! | `/api/admin/...` | graduated detector, admin      |
//!
//! The detector runs first so it counts every request, including those the
//! tier would reject, and an active block short-circuits the tier.

use std::sync::Arc;

use axum::http::Uri;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::middleware::{govern, GovernorChain};
use crate::ratelimit::{Governance, Governor};

/// Build the application router with governance layers applied.
pub fn router(governance: &Governance, trust_proxy: bool) -> Router {
    let standard: Arc<dyn Governor> = governance.standard.clone();
    let auth: Arc<dyn Governor> = governance.auth.clone();
    let public: Arc<dyn Governor> = governance.public.clone();
    let admin: Arc<dyn Governor> = governance.admin.clone();
    let detector: Arc<dyn Governor> = governance.detector.clone();

    let chain = |governors: Vec<Arc<dyn Governor>>| {
        governors
            .into_iter()
            .fold(GovernorChain::new().with_trust_proxy(trust_proxy), GovernorChain::with)
    };

    let health = Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route_layer(from_fn_with_state(chain(vec![standard.clone()]), govern));

    let api = Router::new()
        .route("/api/listings", get(accepted))
        .route("/api/listings/{id}", get(accepted))
        .route("/api/bookings", post(accepted))
        .route_layer(from_fn_with_state(
            chain(vec![detector.clone(), standard]),
            govern,
        ));

    let auth = Router::new()
        .route("/api/auth/login", post(accepted))
        .route("/api/auth/register", post(accepted))
        .route_layer(from_fn_with_state(chain(vec![auth]), govern));

    let public = Router::new()
        .route("/api/public/listings", get(accepted))
        .route("/api/public/categories", get(accepted))
        .route_layer(from_fn_with_state(chain(vec![public]), govern));

    let admin = Router::new()
        .route("/api/admin/users", get(accepted))
        .route("/api/admin/reports", get(accepted))
        .route_layer(from_fn_with_state(chain(vec![detector, admin]), govern));

    Router::new()
        .merge(health)
        .merge(api)
        .merge(auth)
        .merge(public)
        .merge(admin)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Placeholder for the application handlers behind the governors.
async fn accepted(uri: Uri) -> Json<Value> {
    Json(json!({ "status": "ok", "path": uri.path() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use crate::ratelimit::{Principal, TierOverrides};
    use crate::store::{MemoryStore, StoreHandle};
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn app() -> Router {
        let handle = StoreHandle::from_memory(MemoryStore::new());
        let governance = Governance::build(
            &RateLimitingConfig::default(),
            &TierOverrides::default(),
            &handle,
        );
        router(&governance, false)
    }

    fn request(method: Method, path: &str, addr: [u8; 4]) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((addr, 40000))));
        req
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn test_health_is_never_limited() {
        let app = app();
        for _ in 0..70 {
            let response = send(&app, request(Method::GET, "/health", [10, 1, 1, 1])).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("ratelimit-limit").is_none());
        }
    }

    #[tokio::test]
    async fn test_auth_allows_ten_then_rejects() {
        let app = app();
        for i in 0..10 {
            let response = send(&app, request(Method::POST, "/api/auth/login", [10, 2, 2, 2])).await;
            assert_eq!(response.status(), StatusCode::OK, "attempt {}", i + 1);
        }

        let response = send(&app, request(Method::POST, "/api/auth/login", [10, 2, 2, 2])).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "900");
        assert_eq!(response.headers()["ratelimit-remaining"], "0");

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({
                "status": 429,
                "message": "Too many authentication attempts, please try again after 15 minutes."
            })
        );
    }

    #[tokio::test]
    async fn test_tiers_count_independently() {
        let app = app();
        for _ in 0..10 {
            send(&app, request(Method::POST, "/api/auth/register", [10, 3, 3, 3])).await;
        }

        let response = send(&app, request(Method::GET, "/api/public/categories", [10, 3, 3, 3])).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-remaining"], "29");

        let response = send(&app, request(Method::GET, "/api/listings/42", [10, 3, 3, 3])).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["ratelimit-remaining"], "59");
    }

    #[tokio::test]
    async fn test_admin_keyed_by_principal() {
        let app = app();
        let mut first = request(Method::GET, "/api/admin/users", [10, 4, 4, 4]);
        first.extensions_mut().insert(Principal::new("admin-1"));
        let response = send(&app, first).await;
        assert_eq!(response.headers()["ratelimit-remaining"], "119");

        // Same principal from a different address shares the window.
        let mut second = request(Method::GET, "/api/admin/reports", [10, 5, 5, 5]);
        second.extensions_mut().insert(Principal::new("admin-1"));
        let response = send(&app, second).await;
        assert_eq!(response.headers()["ratelimit-remaining"], "118");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = send(&app(), request(Method::GET, "/nope", [10, 6, 6, 6])).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
