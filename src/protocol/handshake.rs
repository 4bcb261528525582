//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! The server side validates upgrade headers already parsed by the HTTP
//! stack. The client side writes a raw HTTP/1.1 request and parses the
//! `101 Switching Protocols` response itself.

use axum::http::{HeaderMap, header};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WS_VERSION: &str = "13";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// ```
/// use wsbench::protocol::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Fresh Sec-WebSocket-Key: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// True when the request asks to switch to the WebSocket protocol.
///
/// Used to decide whether a plain route should attempt an upgrade at all.
#[must_use]
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    header_str(headers, header::UPGRADE).is_some_and(|v| has_token(v, "websocket"))
}

/// Validated upgrade request from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request path, e.g. `/ws`.
    pub path: String,
    /// The Sec-WebSocket-Key header value.
    pub key: String,
}

impl HandshakeRequest {
    /// Extract and validate the upgrade headers of an HTTP request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if `Upgrade`, `Connection`,
    /// `Sec-WebSocket-Version` or `Sec-WebSocket-Key` is missing or wrong.
    pub fn from_headers(path: impl Into<String>, headers: &HeaderMap) -> Result<Self> {
        let upgrade = header_str(headers, header::UPGRADE)
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header".into()))?;
        if !has_token(upgrade, "websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = header_str(headers, header::CONNECTION)
            .ok_or_else(|| Error::InvalidHandshake("Missing Connection header".into()))?;
        if !has_token(connection, "upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        match header_str(headers, header::SEC_WEBSOCKET_VERSION) {
            Some(WS_VERSION) => {}
            Some(other) => {
                return Err(Error::InvalidHandshake(format!(
                    "Unsupported WebSocket version: {other}"
                )));
            }
            None => {
                return Err(Error::InvalidHandshake(
                    "Missing Sec-WebSocket-Version header".into(),
                ));
            }
        }

        let key = header_str(headers, header::SEC_WEBSOCKET_KEY)
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Key header".into()))?;
        match BASE64.decode(key) {
            Ok(nonce) if nonce.len() == 16 => {}
            _ => {
                return Err(Error::InvalidHandshake(
                    "Sec-WebSocket-Key must be 16 base64-encoded bytes".into(),
                ));
            }
        }

        Ok(Self {
            path: path.into(),
            key: key.to_string(),
        })
    }

    /// The Sec-WebSocket-Accept value the server must answer with.
    #[must_use]
    pub fn accept_key(&self) -> String {
        compute_accept_key(&self.key)
    }
}

/// Serialize a client upgrade request.
#[must_use]
pub fn client_request(host: &str, path: &str, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: {WS_VERSION}\r\n\
         \r\n"
    )
}

/// Offset just past the blank line ending an HTTP head, if buffered.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parsed server handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept header value.
    pub accept: String,
}

impl HandshakeResponse {
    /// Parse the head of a `101 Switching Protocols` response.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the head is not UTF-8, the status
    /// is not 101, or a required upgrade header is missing.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(head)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let status = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        let code = status.split_whitespace().nth(1);
        if !status.starts_with("HTTP/1.1") || code != Some("101") {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status}"
            )));
        }

        let mut upgrade = false;
        let mut connection = false;
        let mut accept = None;
        for line in lines.take_while(|l| !l.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "upgrade" => upgrade = has_token(value, "websocket"),
                "connection" => connection = has_token(value, "upgrade"),
                "sec-websocket-accept" => accept = Some(value.to_string()),
                _ => {}
            }
        }

        if !upgrade {
            return Err(Error::InvalidHandshake(
                "Missing or invalid Upgrade header in response".into(),
            ));
        }
        if !connection {
            return Err(Error::InvalidHandshake(
                "Missing or invalid Connection header in response".into(),
            ));
        }
        let accept = accept
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?;
        Ok(Self { accept })
    }

    /// Check the accept value against the key the client sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept == compute_accept_key(key) {
            Ok(())
        } else {
            Err(Error::InvalidHandshake(
                "Sec-WebSocket-Accept does not match key".into(),
            ))
        }
    }
}
