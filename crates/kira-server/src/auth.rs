//! Bearer-token authentication middleware for the worker-facing HTTP API.
//!
//! Built as a tower `Layer`/`Service` pair, generalized from a single
//! shared-secret gate to Kira's per-user token model: `POST /auth/login`
//! mints a token bound to a user id and stores it in a shared map; this
//! layer resolves the `Authorization: Bearer <token>` header against that
//! map and inserts the resolved [`AuthedUser`] into the request extensions
//! for handlers to pull out via an extractor. `X-API-Key` carried over as an
//! equivalent header for worker configs that set a static token instead of
//! going through `/auth/login`.

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request, Response, StatusCode},
    response::IntoResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::RwLock;
use tower::{Layer, Service};
use uuid::Uuid;

/// Shared `token -> user_id` map, populated by `/auth/login` and consulted
/// by [`AuthLayer`] on every subsequent request.
#[derive(Debug, Clone, Default)]
pub struct TokenStore(Arc<RwLock<HashMap<String, Uuid>>>);

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn issue(&self, user_id: Uuid) -> String {
        let token = Uuid::new_v4().to_string();
        self.0.write().await.insert(token.clone(), user_id);
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<Uuid> {
        self.0.read().await.get(token).copied()
    }
}

/// The authenticated user id, extracted from request extensions by
/// [`AuthedUser`]'s [`FromRequestParts`] impl. Handlers take this as an
/// argument to learn which worker/user made the request.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, axum::Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthedUser>()
            .copied()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(serde_json::json!({"error": "unauthorized"})),
                )
            })
    }
}

// ---------------------------------------------------------------------------
// AuthLayer
// ---------------------------------------------------------------------------

/// A [`tower::Layer`] that wraps services with [`AuthMiddleware`].
#[derive(Clone)]
pub struct AuthLayer {
    tokens: TokenStore,
}

impl AuthLayer {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthMiddleware
// ---------------------------------------------------------------------------

/// The actual middleware service produced by [`AuthLayer`].
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    tokens: TokenStore,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let tokens = self.tokens.clone();
        let mut inner = self.inner.clone();

        // Try X-API-Key header first, then Authorization: Bearer <token>.
        let provided = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .or_else(|| {
                req.headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "))
                    .map(|s| s.to_string())
            });

        Box::pin(async move {
            let Some(token) = provided else {
                return Ok(unauthorized());
            };
            match tokens.resolve(&token).await {
                Some(user_id) => {
                    req.extensions_mut().insert(AuthedUser(user_id));
                    inner.call(req).await
                }
                None => Ok(unauthorized()),
            }
        })
    }
}

fn unauthorized() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({"error": "unauthorized"})),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn test_router(tokens: TokenStore) -> Router {
        Router::new()
            .route("/ping", get(|AuthedUser(id): AuthedUser| async move { id.to_string() }))
            .layer(AuthLayer::new(tokens))
    }

    #[tokio::test]
    async fn valid_bearer_token_resolves_user() {
        let tokens = TokenStore::new();
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id).await;
        let app = Router::new()
            .route("/ping", get(|AuthedUser(id): AuthedUser| async move { id.to_string() }))
            .layer(AuthLayer::new(tokens));
        let req = Request::builder()
            .uri("/ping")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_x_api_key_header_resolves_user() {
        let tokens = TokenStore::new();
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id).await;
        let app = Router::new()
            .route("/ping", get(|AuthedUser(id): AuthedUser| async move { id.to_string() }))
            .layer(AuthLayer::new(tokens));
        let req = Request::builder()
            .uri("/ping")
            .header("X-API-Key", token)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_returns_401() {
        let app = test_router(TokenStore::new());
        let req = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_token_returns_401() {
        let app = test_router(TokenStore::new());
        let req = Request::builder()
            .uri("/ping")
            .header("Authorization", "Bearer not-a-real-token")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
