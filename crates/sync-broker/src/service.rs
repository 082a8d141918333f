//! Broker service - wires the engine to both transport adapters.
//!
//! Runs the HTTP submission surface, the JSON-RPC consumer surface and the
//! orphan sweep until a shutdown signal arrives or the consumer goes away.

use crate::adapters::{router, McpServer};
use crate::domain::config::{BrokerConfig, ConfigError};
use crate::domain::engine::{cleanup_task, RendezvousEngine};
use crate::ports::RendezvousApi;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Service-level errors (startup and transport failures)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server bind error: {0}")]
    Bind(String),

    #[error("HTTP server error: {0}")]
    Http(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The rendezvous broker service
pub struct SyncService {
    config: BrokerConfig,
    engine: Arc<RendezvousEngine>,
}

impl SyncService {
    /// Create a new service. Fails if the configuration is invalid.
    pub fn new(config: BrokerConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let engine = Arc::new(RendezvousEngine::new(config.cleanup.consumer_idle_timeout));

        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> Arc<RendezvousEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Run with the consumer attached to this process's stdin/stdout.
    pub async fn run_stdio<F>(self, shutdown: F) -> Result<(), ServiceError>
    where
        F: Future<Output = ()> + Send,
    {
        self.run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
            .await
    }

    /// Bind the configured HTTP address and run.
    pub async fn run<R, W, F>(self, reader: R, writer: W, shutdown: F) -> Result<(), ServiceError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServiceError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener, reader, writer, shutdown).await
    }

    /// Run on an already-bound listener.
    pub async fn serve<R, W, F>(
        self,
        listener: TcpListener,
        reader: R,
        writer: W,
        shutdown: F,
    ) -> Result<(), ServiceError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Submission surface listening");

        let cleanup_handle = tokio::spawn(cleanup_task(
            Arc::clone(&self.engine),
            self.config.cleanup.interval,
        ));

        let broker: Arc<dyn RendezvousApi> = self.engine.clone();
        let http_router = router(Arc::clone(&broker), &self.config);
        let mut http_handle =
            tokio::spawn(async move { axum::serve(listener, http_router).await });

        let mcp_server = Arc::new(McpServer::new(broker, self.config.mcp.clone()));
        let exit_on_eof = self.config.mcp.exit_on_eof;
        let consumer = async move {
            let result = mcp_server.serve(reader, writer).await;
            if let Err(e) = &result {
                error!(error = %e, "Consumer stream failed");
            }
            if !exit_on_eof {
                info!("Consumer disconnected, submission surface stays up");
                std::future::pending::<()>().await;
            }
            result
        };

        info!(
            server_name = %self.config.mcp.server_name,
            "Broker started"
        );

        let outcome = tokio::select! {
            _ = shutdown => {
                info!("Received shutdown signal");
                Ok(())
            }
            result = &mut http_handle => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServiceError::Http(e.to_string())),
                Err(e) => Err(ServiceError::Http(e.to_string())),
            },
            result = consumer => {
                info!("Consumer disconnected, stopping");
                result.map_err(ServiceError::from)
            }
        };

        http_handle.abort();
        cleanup_handle.abort();

        let stats = self.engine.stats();
        info!(
            submitted = stats.submitted,
            resolved = stats.resolved,
            detached = stats.detached,
            unknown = stats.unknown,
            swept = stats.swept,
            "Broker stopped"
        );

        outcome
    }
}
