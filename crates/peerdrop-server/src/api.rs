use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{Method, StatusCode},
    middleware,
    routing::get,
    Json, Router,
};
use peerdrop_shared::RoomId;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::store::RoomStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RoomStore>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            store: Arc::new(RoomStore::new(config.room_ttl, config.max_rooms)),
            rate_limiter: RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/:room", get(room_get).put(room_put))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    rooms: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        rooms: state.store.len().await,
    })
}

fn parse_room(raw: &str) -> Result<RoomId, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::InvalidRoom(raw.to_string()))
}

async fn room_put(
    State(state): State<AppState>,
    Path(room): Path<String>,
    body: String,
) -> Result<StatusCode, ServerError> {
    let room = parse_room(&room)?;
    state.store.put(room, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The stored document is returned as a JSON string, which is what peers
/// decode.
async fn room_get(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Result<Json<String>, ServerError> {
    let room = parse_room(&room)?;
    Ok(Json(state.store.get(room).await?))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting relay HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(config: ServerConfig) -> Router {
        build_router(AppState::new(config))
    }

    fn app() -> Router {
        app_with(ServerConfig::default())
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn put(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_is_double_encoded() {
        let app = app();
        let offer = r#"{"type":"offer","sdp":"v=0\r\n"}"#;

        let response = app.clone().oneshot(put("/api/1234567890", offer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(get("/api/1234567890")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        let inner: String = serde_json::from_str(&body).unwrap();
        assert_eq!(inner, offer);
    }

    #[tokio::test]
    async fn test_unknown_room_is_404() {
        let response = app().oneshot(get("/api/123456789")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("123456789"));
    }

    #[tokio::test]
    async fn test_invalid_room_is_400() {
        for uri in ["/api/abc", "/api/42", "/api/99999999999"] {
            let response = app().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_400() {
        let response = app().oneshot(put("/api/123456789", "hello")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let config = ServerConfig {
            max_body_bytes: 16,
            ..Default::default()
        };
        let body = format!(r#"{{"sdp":"{}"}}"#, "x".repeat(64));
        let response = app_with(config)
            .oneshot(put("/api/123456789", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_expired_room_is_404() {
        let config = ServerConfig {
            room_ttl: Duration::ZERO,
            ..Default::default()
        };
        let app = app_with(config);
        app.clone().oneshot(put("/api/123456789", "{}")).await.unwrap();
        let response = app.oneshot(get("/api/123456789")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limited_client_gets_429() {
        let config = ServerConfig {
            rate_limit_per_sec: 0.001,
            rate_limit_burst: 2.0,
            ..Default::default()
        };
        let app = app_with(config);
        let request = || {
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", "203.0.113.1")
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rooms"], 0);
    }
}
