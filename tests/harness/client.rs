//! Echo-protocol client for integration tests.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wsbench::proto::{self, CLIENT_ID, SERVER_ID};
use wsbench::{CloseCode, Config, Connection, Message, WebsocketMessage};

pub struct TestClient {
    pub conn: Connection<TcpStream>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> wsbench::Result<Self> {
        Self::connect_path(addr, "/ws").await
    }

    pub async fn connect_path(addr: SocketAddr, path: &str) -> wsbench::Result<Self> {
        let conn =
            wsbench::client::connect("127.0.0.1", addr.port(), path, Config::client()).await?;
        Ok(Self { conn })
    }

    /// Connect and consume the greeting, asserting its contents.
    pub async fn connect_greeted(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await.unwrap();
        let greeting = client.recv_binary().await.unwrap();
        assert_eq!(
            proto::decode(&greeting).unwrap(),
            WebsocketMessage::greeting()
        );
        client
    }

    pub async fn send_raw(&mut self, bytes: Vec<u8>) -> wsbench::Result<()> {
        self.conn.send(Message::Binary(bytes)).await
    }

    /// Send an encoded message and return the bytes that were sent.
    pub async fn send_content(&mut self, content: &str) -> Vec<u8> {
        let bytes = proto::encode(content, CLIENT_ID, SERVER_ID);
        self.send_raw(bytes.clone()).await.unwrap();
        bytes
    }

    /// Next binary message, skipping pings and pongs. `None` on close or EOF.
    pub async fn recv_binary(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.conn.recv().await.ok()?? {
                Message::Binary(data) => return Some(data),
                Message::Ping(_) | Message::Pong(_) => {}
                _ => return None,
            }
        }
    }

    /// Next message of any kind.
    pub async fn recv(&mut self) -> Option<Message> {
        self.conn.recv().await.ok().flatten()
    }

    pub async fn close(mut self) {
        let _ = self.conn.close(CloseCode::Normal, "bye").await;
        while let Some(msg) = self.recv().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    }
}

/// Plain HTTP/1.1 GET, returning the status code and body.
pub async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8_lossy(&raw).into_owned();

    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}
