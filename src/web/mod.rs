//! Web module
//!
//! HTTP surface of the service: the landmark WebSocket plus a few small
//! JSON endpoints.

pub mod api;
pub mod routes;
pub mod ws;

use axum::Router;
use std::sync::Arc;

use crate::config::HttpConfig;
use crate::AppState;

/// Web server for the landmark stream and API
pub struct WebServer {
    app_state: Arc<AppState>,
    config: HttpConfig,
}

impl WebServer {
    /// Create a new web server
    pub fn new(app_state: Arc<AppState>, config: &HttpConfig) -> Self {
        Self {
            app_state,
            config: config.clone(),
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        routes::create_router(Arc::clone(&self.app_state), &self.config)
    }
}
