//! HTTP surface and the WebSocket upgrade endpoint.
//!
//! Three open routes mint and destroy sessions (`/register`, `/login`,
//! `/logout`); `/ws` sits behind the session gate and upgrades to the
//! persistent per-user socket. `/health` reports liveness and hub counts.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Extension, State};
use axum::middleware;
use axum::response::{Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use tangle_core::constants::MAX_FRAME_SIZE;
use tangle_store::Store;

use crate::config::ServerConfig;
use crate::errors::Result;
use crate::gate::{self, AuthedUser};
use crate::hub::{Hub, pumps};
use crate::shutdown::ShutdownCoordinator;

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    /// Database handle (pooled, cheap to clone).
    pub store: Store,
    /// Registry of live connections and rooms.
    pub hub: Arc<Hub>,
    /// Shutdown fan-out.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server came up.
    pub start_time: Instant,
}

impl AppState {
    /// Build fresh state around an opened store.
    pub fn new(store: Store) -> Self {
        Self {
            store,
            hub: Arc::new(Hub::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }
}

/// The Tangle server: configuration plus shared state.
pub struct TangleServer {
    config: ServerConfig,
    state: AppState,
}

impl TangleServer {
    /// Assemble a server from its configuration and an opened store.
    pub fn new(config: ServerConfig, store: Store) -> Self {
        Self {
            config,
            state: AppState::new(store),
        }
    }

    /// The shared state, for wiring background tasks.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind and serve until the shutdown token fires.
    pub async fn listen(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "listening");

        let token = self.state.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await?;
        Ok(())
    }
}

/// Assemble the route table around shared state.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/ws", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate::require_session,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/register", post(gate::register))
        .route("/login", post(gate::login))
        .route("/logout", post(gate::logout))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    State(state): State<AppState>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| pumps::run_connection(socket, user_id, state))
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    rooms: usize,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.hub.connection_count().await,
        rooms: state.hub.room_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Store::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["connections"], 0);
    }

    #[tokio::test]
    async fn ws_without_cookie_is_unauthorized() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let state = test_state();

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"ada@example.com","password":"pw","firstName":"Ada","lastName":"Lovelace"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("set-cookie"));

        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"ada@example.com","password":"pw"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()["set-cookie"].to_str().unwrap();
        assert!(cookie.starts_with("session_id="));
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthorized() {
        let state = test_state();

        let _ = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"ada@example.com","password":"pw","firstName":"Ada","lastName":"Lovelace"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"ada@example.com","password":"nope"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let state = test_state();
        let body =
            r#"{"email":"ada@example.com","password":"pw","firstName":"Ada","lastName":"L"}"#;

        let first = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }
}
