//! HTTP transport with Streamable HTTP support for the MCP server.
//!
//! This transport uses HTTP with SSE streaming responses,
//! which is suitable for web-based MCP integrations.

use crate::error::{ConnectorError, ConnectorResult};
use crate::mcp::MetadataMcpService;
use crate::service::MetadataService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Time open SSE streams get to finish after a shutdown signal.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport implementation with Streamable HTTP support.
///
/// Every MCP session gets its own [`MetadataMcpService`]; all of them share
/// one [`MetadataService`] and therefore one connector per database.
pub struct HttpTransport {
    service: Arc<MetadataService>,
    host: String,
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        service: Arc<MetadataService>,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            service,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> ConnectorResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        let shared = self.service.clone();
        let mcp = StreamableHttpService::new(
            move || Ok(MetadataMcpService::new(shared.clone())),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service rejects "/", so the root endpoint is a fallback
        let app = if self.endpoint == "/" {
            axum::Router::new().fallback_service(mcp)
        } else {
            axum::Router::new().nest_service(&self.endpoint, mcp)
        };

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ConnectorError::connection(
                format!("Failed to bind to {bind_addr}: {e}"),
                "Check that the port is available",
            )
        })?;

        info!(endpoint = %self.endpoint, "MCP endpoint ready");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let notify = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            notify.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // SSE streams can keep the server alive forever, so bound the drain
        let outcome = tokio::select! {
            result = server => match result {
                Ok(()) => {
                    info!("HTTP server stopped");
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "HTTP server error");
                    Err(ConnectorError::internal(format!("HTTP server error: {e}")))
                }
            },
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );
                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => Ok(()),
        };

        info!("Closing database connections");
        self.service.close_all().await;

        outcome
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLayer;
    use crate::config::FuzzyConfig;
    use crate::connectors::ConnectorRegistry;

    fn service() -> Arc<MetadataService> {
        Arc::new(MetadataService::new(
            Vec::new(),
            ConnectorRegistry::with_default_engines(),
            CacheLayer::disabled(),
            FuzzyConfig::default(),
        ))
    }

    #[test]
    fn test_http_transport_creation() {
        let transport = HttpTransport::new(service(), "127.0.0.1", 8080, "/mcp");
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.bind_addr(), "127.0.0.1:8080");
        assert_eq!(transport.endpoint(), "/mcp");
    }

    #[test]
    fn test_http_transport_root_endpoint() {
        let transport = HttpTransport::new(service(), "0.0.0.0", 3000, "/");
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
        assert_eq!(transport.endpoint(), "/");
    }

    #[tokio::test]
    async fn test_bind_failure_is_connection_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let transport = HttpTransport::new(service(), "127.0.0.1", port, "/mcp");
        let err = transport.run().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Connection { .. }));
    }
}
