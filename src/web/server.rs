//! HTTP server for filestore.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::file::FileService;
use crate::storage::BlobStore;
use crate::{FileStoreError, Result};

use super::handlers::AppState;
use super::middleware::JwtState;
use super::router::{create_health_router, create_router};

/// How often empty date directories are swept from the storage root.
const DIR_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// HTTP server for the file API.
pub struct WebServer {
    addr: SocketAddr,
    app_state: Arc<AppState>,
    jwt_state: Arc<JwtState>,
    cors_origins: Vec<String>,
}

impl WebServer {
    /// Create a new server from configuration and a ready file service.
    pub fn new(config: &ServerConfig, files: FileService) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                FileStoreError::Config(format!(
                    "invalid server address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(files)),
            jwt_state: Arc::new(JwtState::new(&config.jwt_secret)),
            cors_origins: config.cors_origins.clone(),
        })
    }

    /// Get the configured address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the complete application router.
    pub fn router(&self) -> Router {
        create_router(
            self.app_state.clone(),
            self.jwt_state.clone(),
            &self.cors_origins,
        )
        .merge(create_health_router())
    }

    /// Periodically remove empty date directories left by deletions.
    fn start_dir_cleanup_task(storage: BlobStore) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(DIR_CLEANUP_INTERVAL_SECS));

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;

                let storage = storage.clone();
                match tokio::task::spawn_blocking(move || storage.cleanup_empty_dirs()).await {
                    Ok(Ok(0)) => tracing::debug!("No empty storage directories to clean up"),
                    Ok(Ok(count)) => {
                        tracing::info!(removed = count, "Cleaned up empty storage directories")
                    }
                    Ok(Err(e)) => tracing::warn!(error = %e, "Failed to clean up storage directories"),
                    Err(e) => tracing::warn!(error = %e, "Storage cleanup task failed"),
                }
            }
        });
    }

    async fn bind(self) -> std::io::Result<(TcpListener, Router)> {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await?;

        Self::start_dir_cleanup_task(self.app_state.files.storage().clone());

        tracing::info!("Listening on http://{}", listener.local_addr()?);
        Ok((listener, router))
    }

    /// Run the server until it fails.
    pub async fn run(self) -> std::io::Result<()> {
        let (listener, router) = self.bind().await?;
        axum::serve(listener, router).await
    }

    /// Run the server in the background and return the bound address.
    ///
    /// Useful for tests binding to port 0.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
            jwt_secret: "test-secret-key".to_string(),
        }
    }

    async fn test_service(dir: &std::path::Path) -> FileService {
        let db = Database::open_in_memory().await.unwrap();
        let storage = BlobStore::new(dir).unwrap();
        FileService::new(db, storage, 1024 * 1024)
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let dir = tempfile::tempdir().unwrap();
        let server = WebServer::new(&test_config(), test_service(dir.path()).await).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_web_server_invalid_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.host = "not an address".to_string();

        let result = WebServer::new(&config, test_service(dir.path()).await);
        assert!(matches!(result, Err(FileStoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let dir = tempfile::tempdir().unwrap();
        let server = WebServer::new(&test_config(), test_service(dir.path()).await).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));
    }
}
