//! WebSocket frame parsing and serialization (RFC 6455 Section 5.2).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                Masking key (if MASK set)                      |
//! +---------------------------------------------------------------+
//! |                     Payload data                              |
//! +---------------------------------------------------------------+
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask_fast;

/// Maximum payload size for control frames.
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Decoded fixed part of a frame, before the payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub fin: bool,
    pub rsv: u8,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: usize,
    pub header_len: usize,
}

impl FrameHeader {
    /// Header plus payload length, if it fits in `usize`.
    pub fn frame_len(&self) -> Result<usize> {
        self.header_len
            .checked_add(self.payload_len)
            .ok_or(Error::PayloadTooLargeForPlatform {
                size: self.payload_len as u64,
                max: usize::MAX as u64,
            })
    }
}

/// Decode a frame header without consuming the buffer.
///
/// # Errors
///
/// - `Error::IncompleteFrame` if the header is not fully buffered yet
/// - `Error::ReservedOpcode` for reserved opcodes
/// - `Error::PayloadTooLargeForPlatform` if the 64-bit length does not fit
pub(crate) fn peek_header(buf: &[u8]) -> Result<FrameHeader> {
    let [byte0, byte1, ..] = *buf else {
        return Err(Error::IncompleteFrame {
            needed: 2 - buf.len(),
        });
    };

    let fin = byte0 & 0x80 != 0;
    let rsv = (byte0 >> 4) & 0x07;
    let opcode = OpCode::from_u8(byte0 & 0x0F)?;
    let masked = byte1 & 0x80 != 0;

    let (payload_len, len_end) = match byte1 & 0x7F {
        126 => {
            let ext = need(buf, 4)?;
            (u16::from_be_bytes([ext[2], ext[3]]) as usize, 4)
        }
        127 => {
            let ext = need(buf, 10)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&ext[2..10]);
            let len = u64::from_be_bytes(raw);
            if len >> 63 != 0 {
                return Err(Error::InvalidFrame(
                    "most significant bit of 64-bit length set".into(),
                ));
            }
            let len = usize::try_from(len).map_err(|_| Error::PayloadTooLargeForPlatform {
                size: len,
                max: usize::MAX as u64,
            })?;
            (len, 10)
        }
        short => (short as usize, 2),
    };

    let (mask, header_len) = if masked {
        let key = need(buf, len_end + 4)?;
        let mut mask = [0u8; 4];
        mask.copy_from_slice(&key[len_end..len_end + 4]);
        (Some(mask), len_end + 4)
    } else {
        (None, len_end)
    };

    Ok(FrameHeader {
        fin,
        rsv,
        opcode,
        mask,
        payload_len,
        header_len,
    })
}

#[inline]
fn need(buf: &[u8], len: usize) -> Result<&[u8]> {
    if buf.len() < len {
        Err(Error::IncompleteFrame {
            needed: len - buf.len(),
        })
    } else {
        Ok(buf)
    }
}

/// A single WebSocket frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// RSV1..RSV3 packed into the low three bits. Zero without extensions.
    pub rsv: u8,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv: 0,
            opcode,
            payload,
        }
    }

    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Close frame. Without a code the payload is empty.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = Vec::with_capacity(2 + reason.len());
                data.extend_from_slice(&code.to_be_bytes());
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse one complete frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// `Error::IncompleteFrame` when more bytes are needed, or any header error.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = peek_header(buf)?;
        let total = header.frame_len()?;
        let body = need(buf, total)?;
        Ok((Self::from_parts(&header, &body[header.header_len..total]), total))
    }

    /// Build a frame from a decoded header and its raw (possibly masked) payload.
    pub(crate) fn from_parts(header: &FrameHeader, raw: &[u8]) -> Self {
        let mut payload = raw.to_vec();
        if let Some(mask) = header.mask {
            apply_mask_fast(&mut payload, mask);
        }
        Self {
            fin: header.fin,
            rsv: header.rsv,
            opcode: header.opcode,
            payload,
        }
    }

    /// Check the RFC 6455 rules that apply to a frame in isolation.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control payload exceeds 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }
        Ok(())
    }

    /// Append the wire encoding of this frame to `dst`.
    ///
    /// Client frames must pass a mask; server frames pass `None`.
    pub fn write(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        let len = self.payload.len();
        dst.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8() | ((self.rsv & 0x07) << 4);
        if self.fin {
            byte0 |= 0x80;
        }
        dst.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0 };
        if len <= 125 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= usize::from(u16::MAX) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask_fast(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Number of bytes [`Frame::write`] will produce.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let ext = match len {
            0..=125 => 0,
            126..=65535 => 2,
            _ => 8,
        };
        2 + ext + if masked { 4 } else { 0 } + len
    }
}
