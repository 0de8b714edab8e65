//! HTTP server for dataset exports

pub mod routes;
pub mod state;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ExportConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Dataset export HTTP server
pub struct ExportServer {
    config: ExportConfig,
    state: AppState,
}

impl ExportServer {
    /// Create a new server, connecting the configured backend
    pub async fn new(config: ExportConfig) -> Result<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    /// Create a server over prepared state
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: state.config().clone(),
            state,
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            // Health check
            .route("/health", get(health_check))
            .route("/ready", get(readiness))
            .merge(routes::api_routes())
            .with_state(self.state.clone())
            // Middleware layers (order matters - applied bottom to top)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(self.config.server.request_timeout_secs),
            ))
            .layer(TraceLayer::new_for_http());

        if self.config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting dataset export server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{MemoryObjectStore, MemoryRecordStore};
    use crate::providers::RecordStoreProvider;
    use crate::types::{FormScope, Record, RecordId};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn server() -> ExportServer {
        ExportServer::with_state(AppState::with_providers(
            ExportConfig::default(),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryObjectStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let router = server().build_router();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dataset_route_mounted_at_root() {
        let response = server()
            .build_router()
            .oneshot(Request::builder().uri("/generate-dataset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Record store whose listing never completes
    struct HangingRecords;

    #[async_trait]
    impl RecordStoreProvider for HangingRecords {
        async fn list_record_ids(&self, _scope: &FormScope) -> Result<Vec<RecordId>> {
            std::future::pending().await
        }

        async fn get_record(&self, _scope: &FormScope, id: &RecordId) -> Result<Record> {
            Err(Error::RecordNotFound(id.to_string()))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_slow_export_times_out_with_408() {
        let mut config = ExportConfig::default();
        config.server.request_timeout_secs = 1;
        let server = ExportServer::with_state(AppState::with_providers(
            config,
            Arc::new(HangingRecords),
            Arc::new(MemoryObjectStore::new()),
        ));

        let response = server
            .build_router()
            .oneshot(
                Request::builder()
                    .uri("/generate-dataset?project_id=p1&form_id=f1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_address() {
        assert_eq!(server().address(), "0.0.0.0:8080");
    }
}
