//! Shared utilities for end-to-end tests.

use std::net::SocketAddr;
use std::sync::Arc;

use handler_bridge::config::{parse_config, BridgeConfig};
use handler_bridge::lifecycle::{bootstrap, Shutdown};
use handler_bridge::samples::default_registry;
use handler_bridge::{BridgeContext, HttpServer};
use tokio::net::TcpListener;

/// A bridge serving on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub context: Arc<BridgeContext>,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Stop accepting, then let the server stop its context.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

/// Boot the sample application configured by `toml`.
pub async fn start_server(toml: &str) -> TestServer {
    let config = parse_config(toml).unwrap();
    start_with_config(config).await
}

pub async fn start_with_config(mut config: BridgeConfig) -> TestServer {
    config.listener.bind_address = "127.0.0.1:0".to_string();
    let context = bootstrap(&config, &default_registry()).unwrap();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    let server = HttpServer::new(&config, context.clone());
    tokio::spawn(async move {
        server.run(listener, receiver).await.unwrap();
    });

    TestServer {
        addr,
        context,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
