//! Minimal WebSocket client over plain TCP.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::protocol::handshake::find_head_end;
use crate::protocol::{HandshakeResponse, client_request, generate_key};

/// Open a TCP connection to `host:port` and perform the upgrade on `path`.
///
/// Bytes that arrive after the `101` head are kept for the first frame read.
///
/// # Errors
///
/// `Error::Io` for connection failures, `Error::InvalidHandshake` or
/// `Error::HandshakeTooLarge` for a bad server response.
pub async fn connect(
    host: &str,
    port: u16,
    path: &str,
    config: Config,
) -> Result<Connection<TcpStream>> {
    let authority = format!("{host}:{port}");
    let mut stream = TcpStream::connect(&authority).await?;
    stream.set_nodelay(true)?;

    let key = generate_key()?;
    stream
        .write_all(client_request(&authority, path, &key).as_bytes())
        .await?;

    let mut buf = BytesMut::with_capacity(1024);
    let head_len = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        config.limits.check_handshake_size(buf.len())?;
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed during handshake".into(),
            ));
        }
    };
    config.limits.check_handshake_size(head_len)?;

    let head = buf.split_to(head_len);
    HandshakeResponse::parse(&head)?.verify(&key)?;
    debug!(%authority, path, leftover = buf.len(), "handshake complete");

    Ok(Connection::with_read_buffer(stream, Role::Client, config, buf))
}
