use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::WebSocketCodec;
use crate::config::Config;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{Frame, MessageAssembler, OpCode};

/// A WebSocket connection over an already-upgraded async stream.
///
/// `recv` answers pings and close requests on its own, so callers only see
/// data messages plus a notification of each control frame.
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    state: ConnectionState,
    assembler: MessageAssembler,
}

impl<T> Connection<T> {
    /// Wrap a stream on which the handshake has already completed.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let assembler = MessageAssembler::new(config.limits.clone());
        Self {
            codec: WebSocketCodec::new(io, role, config),
            state: ConnectionState::Open,
            assembler,
        }
    }

    /// Like [`Connection::new`], seeding the read buffer with bytes that
    /// arrived together with the handshake response.
    pub fn with_read_buffer(io: T, role: Role, config: Config, leftover: BytesMut) -> Self {
        let assembler = MessageAssembler::new(config.limits.clone());
        Self {
            codec: WebSocketCodec::with_read_buffer(io, role, config, leftover),
            state: ConnectionState::Open,
            assembler,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn role(&self) -> Role {
        self.codec.role()
    }
}

/// Codes a peer may legitimately put in a Close frame (RFC 6455 Section 7.4).
fn is_valid_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
}

fn parse_close_payload(payload: &[u8]) -> Result<Option<CloseFrame>> {
    match payload {
        [] => Ok(None),
        [_] => Err(Error::ProtocolViolation("Close payload of one byte".into())),
        [hi, lo, reason @ ..] => {
            let code = u16::from_be_bytes([*hi, *lo]);
            if !is_valid_close_code(code) {
                return Err(Error::InvalidCloseCode(code));
            }
            let reason = std::str::from_utf8(reason)?;
            Ok(Some(CloseFrame::new(CloseCode::from_u16(code), reason)))
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Send one message.
    ///
    /// Data messages larger than the frame limit go out as a fragmented
    /// sequence, so a peer with the same limits accepts every frame.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` unless the connection is open
    /// - `Error::MessageTooLarge` if the payload exceeds the message limit
    /// - `Error::TooManyFragments` if it would need more frames than allowed
    /// - `Error::Io` from the underlying stream
    pub async fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }

        match message {
            Message::Text(text) => self.send_data(OpCode::Text, text.into_bytes()).await,
            Message::Binary(data) => self.send_data(OpCode::Binary, data).await,
            Message::Ping(data) => self.send_control(Frame::ping(data)).await,
            Message::Pong(data) => self.send_control(Frame::pong(data)).await,
            Message::Close(close) => {
                let frame = match close {
                    Some(cf) => Frame::close(Some(cf.code.as_u16()), &cf.reason),
                    None => Frame::close(None, ""),
                };
                frame.validate()?;
                self.state = ConnectionState::Closing;
                self.write_message(std::iter::once(frame)).await
            }
        }
    }

    async fn send_data(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<()> {
        let limits = &self.codec.config().limits;
        limits.check_message_size(payload.len())?;
        let fragments = MessageFragmenter::new(payload, opcode, limits.max_frame_size);
        limits.check_fragment_count(fragments.frame_count())?;
        self.write_message(fragments).await
    }

    async fn send_control(&mut self, frame: Frame) -> Result<()> {
        frame.validate()?;
        self.write_message(std::iter::once(frame)).await
    }

    /// Write every frame and flush once. A failed write leaves the
    /// connection `Errored`.
    async fn write_message<I>(&mut self, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = Frame>,
    {
        let written = self.write_frames(frames).await;
        if written.is_err() {
            self.state = ConnectionState::Errored;
        }
        written
    }

    async fn write_frames<I>(&mut self, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = Frame>,
    {
        for frame in frames {
            self.codec.write_frame(&frame).await?;
        }
        self.codec.flush().await
    }

    async fn write_and_flush(&mut self, frame: &Frame) -> Result<()> {
        self.codec.write_frame(frame).await?;
        self.codec.flush().await
    }

    /// Receive the next message.
    ///
    /// Pings are answered with a pong carrying the same payload before they
    /// are returned. A peer Close is answered, and the connection is then
    /// `Closed`. Returns `Ok(None)` once the stream has ended.
    ///
    /// ## Errors
    ///
    /// Protocol violations and I/O failures. The connection is `Errored`
    /// afterwards; use [`Connection::fail`] to notify the peer.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Ok(None);
        }
        match self.recv_inner().await {
            Ok(msg) => Ok(msg),
            Err(e) => {
                self.state = ConnectionState::Errored;
                Err(e)
            }
        }
    }

    async fn recv_inner(&mut self) -> Result<Option<Message>> {
        loop {
            let Some(frame) = self.codec.read_frame().await? else {
                self.state = ConnectionState::Closed;
                return Ok(None);
            };
            frame.validate()?;

            match frame.opcode {
                OpCode::Ping => {
                    let payload = frame.into_payload();
                    if self.state == ConnectionState::Open {
                        self.write_and_flush(&Frame::pong(payload.clone())).await?;
                    }
                    return Ok(Some(Message::Ping(payload)));
                }
                OpCode::Pong => return Ok(Some(Message::Pong(frame.into_payload()))),
                OpCode::Close => {
                    let close = parse_close_payload(frame.payload())?;
                    if self.state == ConnectionState::Open {
                        let reply = match &close {
                            Some(cf) => Frame::close(Some(cf.code.as_u16()), ""),
                            None => Frame::close(None, ""),
                        };
                        // peer may already be gone
                        let _ = self.write_and_flush(&reply).await;
                    }
                    self.state = ConnectionState::Closed;
                    self.assembler.reset();
                    return Ok(Some(Message::Close(close)));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(message) = self.assembler.push(frame)? {
                        return Ok(Some(message));
                    }
                }
            }
        }
    }

    /// Start the close handshake. A no-op unless the connection is open.
    ///
    /// ## Errors
    ///
    /// `Error::InvalidCloseCode` for reserved codes, or `Error::Io`.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        if code.is_reserved() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }
        self.send(Message::Close(Some(CloseFrame::new(code, reason)))).await
    }

    /// Best-effort Close carrying the code that matches `err`, then mark the
    /// connection `Errored`. Write failures are ignored.
    pub async fn fail(&mut self, err: &Error) {
        if self.state != ConnectionState::Closed {
            if let Some(code) = err.close_code() {
                let frame = Frame::close(Some(code.as_u16()), "");
                let _ = self.write_and_flush(&frame).await;
            }
        }
        self.state = ConnectionState::Errored;
    }

    /// Shut down the write half of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.codec.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    fn pair() -> (Connection<DuplexStream>, Connection<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        (
            Connection::new(a, Role::Server, Config::server()),
            Connection::new(b, Role::Client, Config::client()),
        )
    }

    #[tokio::test]
    async fn test_binary_roundtrip() {
        let (mut server, mut client) = pair();
        client.send(Message::binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(
            server.recv().await.unwrap(),
            Some(Message::Binary(vec![1, 2, 3]))
        );
        server.send(Message::binary(vec![4])).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(Message::Binary(vec![4])));
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let (mut server, mut client) = pair();
        client.send(Message::Ping(b"p".to_vec())).await.unwrap();
        assert_eq!(
            server.recv().await.unwrap(),
            Some(Message::Ping(b"p".to_vec()))
        );
        assert_eq!(
            client.recv().await.unwrap(),
            Some(Message::Pong(b"p".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_peer_close_is_echoed() {
        let (mut server, mut client) = pair();
        client.close(CloseCode::Normal, "bye").await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closing);

        let msg = server.recv().await.unwrap();
        assert_eq!(
            msg,
            Some(Message::Close(Some(CloseFrame::new(CloseCode::Normal, "bye"))))
        );
        assert_eq!(server.state(), ConnectionState::Closed);
        assert!(server.send(Message::binary(vec![1])).await.is_err());

        assert!(matches!(
            client.recv().await.unwrap(),
            Some(Message::Close(Some(cf))) if cf.code == CloseCode::Normal
        ));
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_eof_yields_none_and_closed() {
        let (mut server, client) = pair();
        drop(client);
        assert_eq!(server.recv().await.unwrap(), None);
        assert_eq!(server.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_protocol_error_marks_errored_and_fail_sends_close() {
        let (a, mut raw) = duplex(1024);
        let mut server = Connection::new(a, Role::Server, Config::server());

        // unmasked client frame
        raw.write_all(&[0x82, 0x01, 0x00]).await.unwrap();
        let err = server.recv().await.unwrap_err();
        assert_eq!(err, Error::UnmaskedClientFrame);
        assert_eq!(server.state(), ConnectionState::Errored);

        server.fail(&err).await;
        let mut reply = [0u8; 4];
        raw.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x88, 0x02, 0x03, 0xEA]);
    }

    #[test]
    fn test_invalid_close_payloads() {
        assert!(parse_close_payload(&[0x03]).is_err());
        assert_eq!(
            parse_close_payload(&[0x03, 0xED]),
            Err(Error::InvalidCloseCode(1005))
        );
        assert_eq!(
            parse_close_payload(&[0x03, 0xE8, 0xFF]),
            Err(Error::InvalidUtf8)
        );
        assert_eq!(parse_close_payload(&[]), Ok(None));
    }

    #[tokio::test]
    async fn test_message_too_large_not_sent() {
        let (a, b) = duplex(1024);
        let mut client =
            Connection::new(b, Role::Client, Config::client().with_max_message_size(4));
        let _server = Connection::new(a, Role::Server, Config::server());
        assert!(matches!(
            client.send(Message::binary(vec![0; 5])).await,
            Err(Error::MessageTooLarge { size: 5, max: 4 })
        ));
        assert!(client.is_open());
    }

    #[tokio::test]
    async fn test_message_above_frame_limit_is_fragmented() {
        let (a, b) = duplex(1024 * 1024);
        let mut server = Connection::new(a, Role::Server, Config::server());
        let mut client = Connection::new(b, Role::Client, Config::client());

        let size = 17 * 1024 * 1024;
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let (sent, received) = tokio::join!(
            client.send(Message::binary(payload.clone())),
            server.recv()
        );
        sent.unwrap();
        assert_eq!(received.unwrap(), Some(Message::Binary(payload.clone())));

        // and the echo back to the client
        let (sent, received) = tokio::join!(
            server.send(Message::binary(payload.clone())),
            client.recv()
        );
        sent.unwrap();
        assert_eq!(received.unwrap(), Some(Message::Binary(payload)));
        assert!(server.is_open() && client.is_open());
    }

    #[tokio::test]
    async fn test_fragmented_text_keeps_opcode() {
        let limits = Limits::new(4, 64, 128, 8192);
        let (a, mut raw) = duplex(1024);
        let mut server = Connection::new(a, Role::Server, Config::server().with_limits(limits));

        server.send(Message::text("abcdefghij")).await.unwrap();
        let mut wire = [0u8; 16];
        raw.read_exact(&mut wire).await.unwrap();
        assert_eq!(&wire[..6], &[0x01, 0x04, b'a', b'b', b'c', b'd']);
        assert_eq!(&wire[6..12], &[0x00, 0x04, b'e', b'f', b'g', b'h']);
        assert_eq!(&wire[12..], &[0x80, 0x02, b'i', b'j']);
    }

    #[tokio::test]
    async fn test_too_many_fragments_not_sent() {
        let limits = Limits::new(4, 64, 2, 8192);
        let (a, _b) = duplex(1024);
        let mut server = Connection::new(a, Role::Server, Config::server().with_limits(limits));
        assert!(matches!(
            server.send(Message::binary(vec![0; 9])).await,
            Err(Error::TooManyFragments { count: 3, max: 2 })
        ));
        assert!(server.is_open());
    }

    #[tokio::test]
    async fn test_close_rejects_reserved_code() {
        let (mut server, _client) = pair();
        assert_eq!(
            server.close(CloseCode::Other(1006), "").await,
            Err(Error::InvalidCloseCode(1006))
        );
    }
}
