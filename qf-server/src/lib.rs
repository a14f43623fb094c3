//! qf-server library - QuestionFlow live classroom service
//!
//! Students submit questions ("doubts") and confusion readings to a session;
//! near-duplicate questions are merged and every change is pushed to the
//! session's room over WebSocket or SSE.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use qf_common::config::ServerConfig;
use qf_common::RoomBroadcaster;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod api;
pub mod db;
pub mod services;

use services::{
    CodeResolver, ConfusionAggregator, DoubtLedger, SessionDirectory, SimilarityMatcher,
};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved configuration
    pub config: Arc<ServerConfig>,
    /// Session rooms shared by every realtime transport
    pub rooms: Arc<RoomBroadcaster>,
    /// Short-code index of active sessions
    pub codes: Arc<CodeResolver>,
    pub sessions: Arc<SessionDirectory>,
    pub doubts: Arc<DoubtLedger>,
    pub confusion: Arc<ConfusionAggregator>,
}

impl AppState {
    /// Wire up the services; rebuilds the code index from the store
    pub async fn new(db: SqlitePool, config: ServerConfig) -> qf_common::Result<Self> {
        let rooms = Arc::new(RoomBroadcaster::new(config.connection_buffer));
        let codes = Arc::new(CodeResolver::load(&db).await?);
        let matcher = Arc::new(SimilarityMatcher::from_config(
            config.match_policy,
            config.similarity_threshold,
        ));

        let sessions = Arc::new(SessionDirectory::new(db.clone(), Arc::clone(&codes)));
        let doubts = Arc::new(DoubtLedger::new(db.clone(), Arc::clone(&rooms), matcher));
        let confusion = Arc::new(ConfusionAggregator::new(
            db.clone(),
            Arc::clone(&rooms),
            config.confusion_window,
        ));

        Ok(Self {
            db,
            config: Arc::new(config),
            rooms,
            codes,
            sessions,
            doubts,
            confusion,
        })
    }
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match client_url.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            warn!("Invalid client_url {:?}, allowing any origin", client_url);
            layer.allow_origin(Any)
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, patch};

    let routes = Router::new()
        .route(
            "/api/sessions",
            get(api::list_sessions).post(api::create_session),
        )
        .route("/api/sessions/:id", get(api::get_session))
        .route("/api/sessions/:id/end", patch(api::end_session))
        .route(
            "/api/sessions/:id/doubts",
            get(api::list_doubts).post(api::submit_doubt),
        )
        .route("/api/doubts/:id/answer", patch(api::answer_doubt))
        .route("/api/doubts/:id/upvote", patch(api::upvote_doubt))
        .route(
            "/api/sessions/:id/confusion",
            get(api::get_confusion).post(api::record_confusion),
        )
        .route("/api/sessions/:id/events", get(api::session_event_stream))
        .route("/ws", get(api::ws_handler));

    let cors = cors_layer(&state.config.client_url);

    Router::new()
        .merge(routes)
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
