//! Helpdesk Server - ticket document API
//!
//! Serves the canonical ticket documents over HTTP, backed by a
//! [`DocumentStore`]. The CLI and the cross-store updater reach it through
//! `helpdesk_core::HttpDocumentStore`.

pub mod http;

use std::path::Path;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use helpdesk_core::{DocumentStore, SqliteDocumentStore, StoreError};

/// Shared application state
pub struct AppState {
    pub documents: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// State backed by a SQLite file, created if missing.
    pub fn open(database_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("create {}: {}", parent.display(), e)))?;
        }
        let store = SqliteDocumentStore::open(database_path)?;
        tracing::info!("Opened document store at {:?}", database_path);
        Ok(Self::new(Arc::new(store)))
    }

    /// In-memory state (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(SqliteDocumentStore::open_in_memory()?)))
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Ticket endpoints
        .route(
            "/tickets",
            get(http::list_tickets).post(http::create_ticket),
        )
        .route(
            "/tickets/{id}",
            get(http::get_ticket)
                .patch(http::update_ticket)
                .delete(http::delete_ticket),
        )
        .route("/tickets/{id}/messages", post(http::add_message))
        .route(
            "/tickets/customer/{customer_id}",
            get(http::tickets_by_customer),
        )
        .route("/tickets/status/{status}", get(http::tickets_by_status))
        .route(
            "/tickets/priority/{priority}",
            get(http::tickets_by_priority),
        )
        // System endpoints
        .route("/health", get(http::health))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_on(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    tracing::info!("Helpdesk server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
