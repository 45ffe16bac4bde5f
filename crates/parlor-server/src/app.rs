use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use parlor_api::auth::{self, AppState, AppStateInner};
use parlor_api::middleware::require_session;
use parlor_api::pages;
use parlor_api::render::Renderer;
use parlor_api::session::SessionStore;
use parlor_db::Database;
use parlor_gateway::connection;
use parlor_gateway::dispatcher::Dispatcher;
use parlor_gateway::relay::Relay;

use crate::config::Config;

/// Open the store and wire up the shared state.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let db = Arc::new(Database::open(&config.db_path, config.db_readers)?);
    let relay = Relay::new(db.clone(), Dispatcher::new());

    Ok(Arc::new(AppStateInner {
        db,
        sessions: SessionStore::new(config.session_ttl),
        relay,
        renderer: Renderer::new()?,
        secure_cookies: config.secure_cookies,
    }))
}

pub fn router(state: AppState, public_dir: &Path) -> Router {
    let public_routes = Router::new()
        .route("/", get(pages::login_page))
        .route("/register", get(pages::register_page))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/socket", get(ws_upgrade))
        .route("/health", get(|| async { "ok" }));

    let protected_routes = Router::new()
        .route("/chat", get(pages::chat_page))
        .route("/logout", get(auth::logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind a realtime connection to the caller's session. Without a live
/// session the upgrade is refused, so no socket ever exists.
async fn ws_upgrade(
    State(state): State<AppState>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user) = state.sessions.current_user(&jar).await else {
        warn!("User not authenticated, refusing socket");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, relay, user))
}
