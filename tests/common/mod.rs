//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use hotroute::http::{Dispatcher, ServerError};
use hotroute::{HttpServer, Middleware, ServerConfig, Shutdown};

/// A route tree in a temporary directory.
pub struct RouteTree {
    dir: TempDir,
}

impl RouteTree {
    pub fn new(units: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("routes")).unwrap();
        let tree = Self { dir };
        for (rel, source) in units {
            tree.write(rel, source);
        }
        tree
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("routes")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn write(&self, rel: &str, source: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        path
    }

    /// Config rooted here, artifacts kept inside the temp dir.
    pub fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::with_root(self.root());
        config.routes.cache_dir = Some(self.dir.path().join("cache"));
        config.listener.host = "127.0.0.1".into();
        config.listener.port = 0;
        config
    }
}

/// Pin a file's modification time to a fixed offset from an arbitrary epoch.
pub fn set_mtime(path: &Path, offset_secs: u64) {
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(base + Duration::from_secs(offset_secs)).unwrap();
}

/// A running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub dispatcher: Arc<Dispatcher>,
    shutdown: Shutdown,
    handle: Option<JoinHandle<Result<(), ServerError>>>,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> Self {
        Self::start_with(config, Vec::new()).await
    }

    pub async fn start_with(config: ServerConfig, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = HttpServer::with_middleware(config, middleware);
        let dispatcher = Arc::clone(server.dispatcher());
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        let handle = tokio::spawn(server.run(listener, rx));

        Self {
            addr,
            dispatcher,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
        // The server has released its subscription once `run` returns.
        assert_eq!(self.shutdown.receiver_count(), 0);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or a few seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
