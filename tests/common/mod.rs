//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use blog_backend::config::AppConfig;
use blog_backend::security::password::{CredentialHasher, HashParams};
use blog_backend::store::InMemoryUserStore;
use blog_backend::{HttpServer, Shutdown};
use tokio::net::TcpListener;

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub store: Arc<InMemoryUserStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap();
    }
}

/// Argon2 parameters cheap enough for debug-build tests.
pub fn test_hasher() -> CredentialHasher {
    CredentialHasher::new(HashParams {
        memory_kib: 1024,
        iterations: 1,
        lanes: 1,
        output_len: 32,
    })
}

/// Start a server with `config` on 127.0.0.1 and a random port.
pub async fn spawn_server(mut config: AppConfig) -> TestServer {
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;

    let store = Arc::new(InMemoryUserStore::new(config.database.log_queries));
    let listener = TcpListener::bind(config.listener.bind_address()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::with_hasher(config, store.clone(), test_hasher());
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    TestServer {
        addr,
        shutdown,
        store,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
