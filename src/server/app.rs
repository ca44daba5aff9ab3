use std::sync::Arc;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use axum::{extract::FromRef, http::StatusCode, routing::get, Json, Router};
use prometheus::{Encoder, TextEncoder};
use routes::{auth_router, category_router, questions_router, users_router};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::routes;
use crate::auth::TokenIssuer;
use crate::cache::{spawn_sweeper, QueryCache};
use crate::settings::Settings;

#[derive(FromRef, Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub cache: Arc<QueryCache>,
    pub tokens: Arc<TokenIssuer>,
    #[from_ref(skip)]
    pub allow_registration: bool,
}

impl AppState {
    pub fn new(pool: SqlitePool, cache: QueryCache, tokens: TokenIssuer) -> Self {
        Self {
            pool,
            cache: Arc::new(cache),
            tokens: Arc::new(tokens),
            allow_registration: true,
        }
    }

    pub fn with_registration(mut self, allowed: bool) -> Self {
        self.allow_registration = allowed;
        self
    }

    pub fn from_settings(pool: SqlitePool, settings: &Settings) -> Self {
        let cache = QueryCache::new(settings.cache.ttl(), settings.cache.capacity());
        let tokens = TokenIssuer::new(&settings.auth.jwt_secret, settings.auth.token_lifetime());
        Self::new(pool, cache, tokens).with_registration(settings.auth.allow_registration)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .merge(auth_router(state.clone()))
        .merge(category_router(state.clone()))
        .merge(questions_router(state.clone()))
        .merge(users_router(state))
        .fallback(|| async {
            tracing::info!("Fallback");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "Route not found" })),
            )
        })
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(pool: SqlitePool, settings: &Settings) -> anyhow::Result<()> {
    let addr = settings.server.addr;
    let state = AppState::from_settings(pool, settings);
    let sweeper = spawn_sweeper(state.cache.clone(), settings.cache.sweep_interval());

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Serving on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

async fn index() -> Json<Value> {
    Json(json!({ "message": "Medical Q&A portal API" }))
}

async fn metrics() -> Result<Response, ApiError> {
    let encoder = TextEncoder::new();
    let metrics = prometheus::gather();
    let mut buf = vec![];
    encoder
        .encode(&metrics, &mut buf)
        .map_err(anyhow::Error::from)?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(Body::from(buf))
        .map_err(|e| ApiError::Internal(e.into()))
}
