//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use red_demo::config::ServiceConfig;
use red_demo::http::{AppState, HttpServer};
use red_demo::lifecycle::Shutdown;
use red_demo::workload::OutcomeSource;
use red_demo::RedMetrics;

/// A running service instance bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub metrics: Arc<RedMetrics>,
    pub shutdown: Shutdown,
    pub handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to exit cleanly.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Start the service with the given outcome source.
pub async fn start_server(source: Arc<dyn OutcomeSource>) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServiceConfig::default();
    config.listener.bind_address = addr.to_string();

    let metrics = Arc::new(RedMetrics::new());
    let server = HttpServer::with_state(config, AppState::new(metrics.clone(), source));
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    TestServer {
        addr,
        metrics,
        shutdown,
        handle,
    }
}

/// HTTP client that never pools or proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Read one sample value out of an exposition body.
#[allow(dead_code)]
pub fn sample(body: &str, series: &str) -> Option<f64> {
    body.lines()
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| {
            let (name, value) = l.rsplit_once(' ')?;
            (name == series).then(|| value.parse().ok()).flatten()
        })
}
