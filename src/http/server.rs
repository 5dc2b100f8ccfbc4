//! HTTP server hosting the governed routes.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Result, TollgateError};

/// HTTP server bound to a listener.
pub struct HttpServer {
    /// Bound listener
    listener: TcpListener,
    /// Routes with governance layers applied
    router: Router,
}

impl HttpServer {
    /// Bind the listener. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(addr = %addr, error = %e, "Failed to bind HTTP listener");
            TollgateError::Io(e)
        })?;
        Ok(Self { listener, router })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is killed.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %self.local_addr()?, "Starting HTTP server");

        // Connection info feeds per-address rate limit keys.
        let service = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(self.listener, service)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TollgateError::Http(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use crate::http::routes::router;
    use crate::ratelimit::{Governance, TierOverrides};
    use crate::store::{MemoryStore, StoreHandle};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_server_serves_and_shuts_down() {
        let handle = StoreHandle::from_memory(MemoryStore::new());
        let governance = Governance::build(
            &RateLimitingConfig::default(),
            &TierOverrides::default(),
            &handle,
        );
        let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), router(&governance, false))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_with_shutdown(async {
            let _ = rx.await;
        }));

        let health = raw_get(addr, "/health").await;
        assert!(health.starts_with("HTTP/1.1 200"));

        // Listed routes carry the standard tier headers keyed by peer address.
        let listings = raw_get(addr, "/api/listings").await;
        assert!(listings.starts_with("HTTP/1.1 200"));
        assert!(listings.to_ascii_lowercase().contains("ratelimit-remaining: 59"));

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_an_error() {
        let first = HttpServer::bind("127.0.0.1:0".parse().unwrap(), Router::new())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap();

        assert!(HttpServer::bind(addr, Router::new()).await.is_err());
    }
}
