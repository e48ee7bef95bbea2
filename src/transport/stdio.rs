//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::error::{ConnectorError, ConnectorResult};
use crate::mcp::MetadataMcpService;
use crate::service::MetadataService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Stdio transport implementation.
///
/// This transport reads JSON-RPC messages from stdin and writes
/// responses to stdout, following the MCP protocol specification.
pub struct StdioTransport {
    service: Arc<MetadataService>,
}

impl StdioTransport {
    pub fn new(service: Arc<MetadataService>) -> Self {
        Self { service }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> ConnectorResult<()> {
        info!("Starting MCP server with stdio transport");

        let server = MetadataMcpService::new(self.service.clone());
        let running_service = server.serve(stdio()).await.map_err(|e| {
            ConnectorError::internal(format!("Failed to start stdio transport: {e}"))
        })?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                if let Err(e) = result {
                    warn!(error = %e, "Stdio transport error");
                    self.service.close_all().await;
                    return Err(ConnectorError::internal(format!("Stdio transport error: {e}")));
                }
                info!("Stdio transport completed normally");
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing all database connections");
        self.service.close_all().await;

        if shutdown_requested {
            // stdin reads block and cannot be interrupted by select!
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLayer;
    use crate::config::FuzzyConfig;
    use crate::connectors::ConnectorRegistry;

    #[test]
    fn test_stdio_transport_creation() {
        let service = MetadataService::new(
            Vec::new(),
            ConnectorRegistry::with_default_engines(),
            CacheLayer::disabled(),
            FuzzyConfig::default(),
        );
        let transport = StdioTransport::new(Arc::new(service));
        assert_eq!(transport.name(), "stdio");
    }
}
