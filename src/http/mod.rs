//! JSON API over the group store. Handlers are thin: they extract the caller
//! and inputs, run the domain call on the blocking pool and wrap the result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::SessionPolicy;
use crate::config::Config;
use crate::db::{self, Db};

mod account;
pub mod extract;
mod games;
mod groups;
mod matchdays;
mod players;
mod reports;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            password_rounds: self.config.password_rounds,
            ttl_hours: self.config.session_ttl_hours,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true, "service": "matchday"}))
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let allow = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    Some(
        CorsLayer::new()
            .allow_origin(allow)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .max_age(Duration::from_secs(60 * 60)),
    )
}

pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.max_body_bytes;
    let cors = cors_layer(&state.config.cors_origins);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(account::register))
        .route("/api/auth/login", post(account::login))
        .route("/api/auth/logout", post(account::logout))
        .route("/api/me", get(account::me))
        .route("/api/groups", get(groups::list).post(groups::create))
        .route("/api/groups/join", post(groups::join))
        .route(
            "/api/groups/:gid",
            get(groups::get).patch(groups::update).delete(groups::remove),
        )
        .route("/api/groups/:gid/restore", post(groups::restore))
        .route("/api/groups/:gid/invite-code", post(groups::regenerate_invite))
        .route("/api/groups/:gid/leave", post(groups::leave))
        .route("/api/groups/:gid/members", get(groups::members))
        .route(
            "/api/groups/:gid/members/:uid",
            patch(groups::change_role).delete(groups::remove_member),
        )
        .route(
            "/api/groups/:gid/players",
            get(players::list).post(players::create),
        )
        .route("/api/groups/:gid/players/order", put(players::reorder))
        .route(
            "/api/groups/:gid/players/:pid",
            get(players::get).patch(players::update).delete(players::remove),
        )
        .route("/api/groups/:gid/players/:pid/restore", post(players::restore))
        .route(
            "/api/groups/:gid/matchdays",
            get(matchdays::list).post(matchdays::create),
        )
        .route(
            "/api/groups/:gid/matchdays/:mid",
            get(matchdays::get)
                .patch(matchdays::update)
                .delete(matchdays::remove),
        )
        .route("/api/groups/:gid/matchdays/:mid/restore", post(matchdays::restore))
        .route(
            "/api/groups/:gid/matchdays/:mid/teams",
            get(matchdays::list_teams).post(matchdays::create_team),
        )
        .route(
            "/api/groups/:gid/matchdays/:mid/teams/generate",
            post(matchdays::generate_teams),
        )
        .route(
            "/api/groups/:gid/matchdays/:mid/standings",
            get(reports::standings),
        )
        .route(
            "/api/groups/:gid/matchdays/:mid/games",
            get(games::list).post(games::create),
        )
        .route(
            "/api/groups/:gid/teams/:tid",
            patch(matchdays::update_team).delete(matchdays::delete_team),
        )
        .route("/api/groups/:gid/teams/:tid/players", put(matchdays::assign_players))
        .route(
            "/api/groups/:gid/games/:game_id",
            get(games::get).patch(games::update).delete(games::remove),
        )
        .route("/api/groups/:gid/games/:game_id/restore", post(games::restore))
        .route("/api/groups/:gid/games/:game_id/events", post(games::add_event))
        .route(
            "/api/groups/:gid/games/:game_id/events/:eid",
            delete(games::delete_event),
        )
        .route(
            "/api/groups/:gid/games/:game_id/shootout",
            put(games::record_shootout).delete(games::delete_shootout),
        )
        .route("/api/groups/:gid/stats", get(reports::stats))
        .route("/api/groups/:gid/stats/export", get(reports::export))
        .route("/api/groups/:gid/activity", get(reports::activity))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// Serves on an already bound listener until ctrl-c or SIGTERM.
pub async fn serve_on(listener: TcpListener, state: AppState) -> Result<()> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

pub async fn start_server(config: Config) -> Result<()> {
    info!(path = %config.db_path.display(), "opening database");
    let conn = db::open_db(&config.db_path)?;
    let state = AppState::new(Db::new(conn), config);

    let address = state.config.bind_addr.clone();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("bind {address}"))?;
    info!("Server running on {address}");

    serve_on(listener, state).await?;
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                warn!(error = %err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
