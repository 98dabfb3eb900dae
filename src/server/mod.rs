// src/server/mod.rs

mod auth;
mod error;
mod handlers;
mod undo;

pub use undo::UndoStack;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crate::config::VocabularyConfig;
use crate::ledger::Ledger;
use crate::pipeline::ReceiptParser;

/// Phone photos are well over axum's default body limit.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub struct AppState {
    pub parser: ReceiptParser,
    pub ledger: Arc<dyn Ledger>,
    pub vocabulary: VocabularyConfig,
    pub undo: UndoStack,
    pub auth_token: Option<String>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        parser: ReceiptParser,
        ledger: Arc<dyn Ledger>,
        vocabulary: VocabularyConfig,
        auth_token: &str,
    ) -> Self {
        Self {
            parser,
            ledger,
            vocabulary,
            undo: UndoStack::default(),
            auth_token: Some(auth_token.to_string()).filter(|t| !t.is_empty()),
        }
    }
}

/// API under `/api`, and the frontend at `/` when its directory exists.
pub fn router(state: SharedState, frontend_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/config", get(handlers::get_config))
        .route("/upload", post(handlers::upload_receipt))
        .route("/manual", post(handlers::manual_entry))
        .route(
            "/entry/{row}",
            patch(handlers::update_entry).delete(handlers::delete_entry),
        )
        .route("/undo", delete(handlers::undo_last))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    let app = Router::new().nest("/api", api);
    let app = match frontend_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            info!(dir = %dir.display(), "Serving frontend");
            let spa = ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html")));
            app.fallback_service(spa)
        }
        None => app,
    };
    app.with_state(state)
}
