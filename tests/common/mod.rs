//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use url_fanout::config::FanoutConfig;
use url_fanout::fetch::HttpFetcher;
use url_fanout::net::LimitedListener;
use url_fanout::HttpServer;

/// Start a mock backend that answers every request with `status_line`.
pub async fn start_mock_backend(status_line: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = socket.read(&mut buf).await;
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status_line
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// A running service bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: broadcast::Sender<()>,
    pub handle: JoinHandle<std::io::Result<()>>,
}

/// Start the service with `config`, fetching through a proxy-free client.
pub async fn start_server(mut config: FanoutConfig) -> TestServer {
    config.listener.bind_address = "127.0.0.1:0".into();
    let listener = LimitedListener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(config.fetch.timeout())
        .build()
        .unwrap();
    let fetch_timeout = config.fetch.timeout();
    let server = HttpServer::new(config, HttpFetcher::from_client(client, fetch_timeout));

    let (shutdown, rx) = broadcast::channel(1);
    let handle = tokio::spawn(server.run(listener, rx));

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

/// Client that talks to the test server without system proxies or pooling.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
