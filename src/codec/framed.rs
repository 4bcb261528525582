use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::protocol::frame::{FrameHeader, peek_header};

/// Seed for the client mask sequence. Falls back to the clock if the OS
/// random source fails.
fn mask_seed() -> u64 {
    let mut buf = [0u8; 8];
    match getrandom::getrandom(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        Err(_) => std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x2545_F491_4F6C_DD1D),
    }
}

/// Frame-level reader and writer over an async byte stream.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    role: Role,
    config: Config,
    mask_state: u64,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let read_buf = BytesMut::with_capacity(config.read_buffer_size);
        Self::with_read_buffer(io, role, config, read_buf)
    }

    /// Start from bytes that were read past the end of the HTTP handshake.
    #[must_use]
    pub fn with_read_buffer(io: T, role: Role, config: Config, read_buf: BytesMut) -> Self {
        Self {
            io,
            read_buf,
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            role,
            config,
            mask_state: mask_seed() | 1,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // xorshift64*
    fn next_mask(&mut self) -> [u8; 4] {
        let mut x = self.mask_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.mask_state = x;
        let out = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        ((out >> 32) as u32).to_le_bytes()
    }

    /// Reject frames this endpoint must never accept, before buffering the payload.
    fn check_header(&self, header: &FrameHeader) -> Result<()> {
        if header.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        match (self.role.expects_masked(), header.mask.is_some()) {
            (true, false) if !self.config.accept_unmasked_frames => {
                return Err(Error::UnmaskedClientFrame);
            }
            (false, true) => return Err(Error::MaskedServerFrame),
            _ => {}
        }
        self.config.limits.check_frame_size(header.payload_len)
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` when the peer closes the stream on a frame boundary.
    ///
    /// # Errors
    ///
    /// Header violations for this role, `Error::Io` for transport failures,
    /// including EOF in the middle of a frame.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match peek_header(&self.read_buf) {
                Ok(header) => {
                    self.check_header(&header)?;
                    let total = header.frame_len()?;
                    if self.read_buf.len() >= total {
                        let frame =
                            Frame::from_parts(&header, &self.read_buf[header.header_len..total]);
                        self.read_buf.advance(total);
                        return Ok(Some(frame));
                    }
                    self.read_buf.reserve(total - self.read_buf.len());
                }
                Err(Error::IncompleteFrame { .. }) => {
                    self.read_buf.reserve(self.config.read_buffer_size);
                }
                Err(e) => return Err(e),
            }

            if self.io.read_buf(&mut self.read_buf).await? == 0 {
                return if self.read_buf.is_empty() {
                    Ok(None)
                } else {
                    Err(Error::Io(format!(
                        "stream ended with {} bytes of a partial frame",
                        self.read_buf.len()
                    )))
                };
            }
        }
    }

    /// Encode and write a frame, masking it when this endpoint is a client.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the write fails.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.must_mask().then(|| self.next_mask());
        self.write_buf.clear();
        frame.write(&mut self.write_buf, mask);
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
