//! The benchmark's application message and its protobuf encoding.
//!
//! ```text
//! message WebsocketMessage {
//!   string content     = 1;
//!   string sender_id   = 2;
//!   string receiver_id = 3;
//! }
//! ```
//!
//! Encoding follows proto3: fields in number order, empty strings omitted.
//! Decoding accepts anything a conforming protobuf encoder could produce for
//! this schema, including unknown and repeated fields.

mod varint;

use bytes::BufMut;

use crate::error::DecodeError;

pub use varint::{MAX_VARINT_LEN, put_varint, read_varint, varint_len};

/// Content of the greeting the server sends when a session opens.
pub const GREETING_CONTENT: &str = "Connection established successfully!";
/// `sender_id` used by the server.
pub const SERVER_ID: &str = "server";
/// `receiver_id` the server addresses clients with.
pub const CLIENT_ID: &str = "client";

const FIELD_CONTENT: u32 = 1;
const FIELD_SENDER_ID: u32 = 2;
const FIELD_RECEIVER_ID: u32 = 3;
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;
const MAX_GROUP_DEPTH: usize = 64;

/// Protobuf wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    fn from_tag(field: u32, raw: u8) -> Result<Self, DecodeError> {
        match raw {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            wire_type => Err(DecodeError::UnsupportedWireType { field, wire_type }),
        }
    }
}

/// The one message type exchanged between load generators and the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WebsocketMessage {
    pub content: String,
    pub sender_id: String,
    pub receiver_id: String,
}

impl WebsocketMessage {
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
        }
    }

    /// The message the server sends right after a connection opens.
    #[must_use]
    pub fn greeting() -> Self {
        Self::new(GREETING_CONTENT, SERVER_ID, CLIENT_ID)
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.content, &self.sender_id, &self.receiver_id)
    }

    /// Size of [`WebsocketMessage::encode`]'s output.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        [&self.content, &self.sender_id, &self.receiver_id]
            .into_iter()
            .map(|s| string_field_len(s))
            .sum()
    }

    /// Parse a message from its wire encoding.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when `buf` is not a structurally valid encoding.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        decode(buf)
    }
}

fn string_field_len(value: &str) -> usize {
    if value.is_empty() {
        0
    } else {
        1 + varint_len(value.len() as u64) + value.len()
    }
}

fn put_string_field(dst: &mut impl BufMut, field: u32, value: &str) {
    if value.is_empty() {
        return;
    }
    put_varint(dst, u64::from((field << 3) | 2));
    put_varint(dst, value.len() as u64);
    dst.put_slice(value.as_bytes());
}

/// Encode the three fields. Deterministic, never fails.
#[must_use]
pub fn encode(content: &str, sender_id: &str, receiver_id: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        string_field_len(content) + string_field_len(sender_id) + string_field_len(receiver_id),
    );
    put_string_field(&mut out, FIELD_CONTENT, content);
    put_string_field(&mut out, FIELD_SENDER_ID, sender_id);
    put_string_field(&mut out, FIELD_RECEIVER_ID, receiver_id);
    out
}

fn take(buf: &[u8], pos: usize, len: usize) -> Option<&[u8]> {
    buf.get(pos..pos.checked_add(len)?)
}

/// Decode a [`WebsocketMessage`]. Absent fields are empty strings.
///
/// # Errors
///
/// See [`DecodeError`] for the structural faults that are rejected.
pub fn decode(buf: &[u8]) -> Result<WebsocketMessage, DecodeError> {
    let mut msg = WebsocketMessage::default();
    let mut pos = 0;

    while pos < buf.len() {
        let (field, wire_type) = read_tag(buf, &mut pos)?;
        if wire_type != WireType::LengthDelimited {
            skip_field(buf, &mut pos, field, wire_type, 0)?;
            continue;
        }

        let bytes = read_length_delimited(buf, &mut pos, field)?;
        let slot = match field {
            FIELD_CONTENT => &mut msg.content,
            FIELD_SENDER_ID => &mut msg.sender_id,
            FIELD_RECEIVER_ID => &mut msg.receiver_id,
            _ => continue,
        };
        let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })?;
        text.clone_into(slot);
    }

    Ok(msg)
}

fn read_tag(buf: &[u8], pos: &mut usize) -> Result<(u32, WireType), DecodeError> {
    let (tag, n) = read_varint(&buf[*pos..], *pos)?;
    *pos += n;

    let field_number = tag >> 3;
    if field_number == 0 || field_number > MAX_FIELD_NUMBER {
        return Err(DecodeError::InvalidFieldNumber(field_number));
    }
    let field = field_number as u32;
    Ok((field, WireType::from_tag(field, (tag & 0x07) as u8)?))
}

fn read_length_delimited<'a>(
    buf: &'a [u8],
    pos: &mut usize,
    field: u32,
) -> Result<&'a [u8], DecodeError> {
    let (len, n) = read_varint(&buf[*pos..], *pos)?;
    *pos += n;
    let bytes = usize::try_from(len)
        .ok()
        .and_then(|len| take(buf, *pos, len))
        .ok_or(DecodeError::LengthOutOfBounds {
            field,
            len,
            remaining: buf.len() - *pos,
        })?;
    *pos += bytes.len();
    Ok(bytes)
}

/// Step over one field this schema does not read, including whole groups.
fn skip_field(
    buf: &[u8],
    pos: &mut usize,
    field: u32,
    wire_type: WireType,
    depth: usize,
) -> Result<(), DecodeError> {
    match wire_type {
        WireType::Varint => {
            let (_, n) = read_varint(&buf[*pos..], *pos)?;
            *pos += n;
        }
        WireType::Fixed64 | WireType::Fixed32 => {
            let needed = if wire_type == WireType::Fixed64 { 8 } else { 4 };
            let remaining = buf.len() - *pos;
            if remaining < needed {
                return Err(DecodeError::TruncatedFixed {
                    field,
                    needed,
                    remaining,
                });
            }
            *pos += needed;
        }
        WireType::LengthDelimited => {
            read_length_delimited(buf, pos, field)?;
        }
        WireType::StartGroup => {
            if depth >= MAX_GROUP_DEPTH {
                return Err(DecodeError::GroupTooDeep { field });
            }
            loop {
                if *pos >= buf.len() {
                    return Err(DecodeError::UnterminatedGroup { field });
                }
                let (inner, inner_type) = read_tag(buf, pos)?;
                if inner_type == WireType::EndGroup {
                    if inner != field {
                        return Err(DecodeError::MismatchedEndGroup {
                            expected: field,
                            found: inner,
                        });
                    }
                    break;
                }
                skip_field(buf, pos, inner, inner_type, depth + 1)?;
            }
        }
        WireType::EndGroup => return Err(DecodeError::UnexpectedEndGroup { field }),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WebsocketMessage {
        WebsocketMessage::new("Hello, WebSocket!", "client", "server")
    }

    #[test]
    fn test_known_encoding() {
        assert_eq!(
            encode("hi", "a", ""),
            [0x0A, 0x02, b'h', b'i', 0x12, 0x01, b'a']
        );
        assert!(encode("", "", "").is_empty());
    }

    #[test]
    fn test_roundtrip_sample_and_greeting() {
        for msg in [sample(), WebsocketMessage::greeting()] {
            let bytes = msg.encode();
            assert_eq!(bytes.len(), msg.encoded_len());
            assert_eq!(decode(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn test_greeting_fields() {
        let greeting = WebsocketMessage::greeting();
        assert_eq!(greeting.content, "Connection established successfully!");
        assert_eq!(greeting.sender_id, "server");
        assert_eq!(greeting.receiver_id, "client");
    }

    #[test]
    fn test_empty_input_is_default() {
        assert_eq!(decode(&[]).unwrap(), WebsocketMessage::default());
    }

    #[test]
    fn test_truncated_to_two_bytes() {
        let bytes = sample().encode();
        assert_eq!(
            decode(&bytes[..2]),
            Err(DecodeError::LengthOutOfBounds {
                field: 1,
                len: 17,
                remaining: 0
            })
        );
    }

    #[test]
    fn test_long_string_uses_multibyte_length() {
        let content = "x".repeat(300);
        let bytes = encode(&content, "", "");
        assert_eq!(&bytes[..3], &[0x0A, 0xAC, 0x02]);
        assert_eq!(decode(&bytes).unwrap().content, content);
    }

    #[test]
    fn test_unknown_fields_skipped() {
        let mut bytes = Vec::new();
        // field 4, varint
        bytes.extend_from_slice(&[0x20, 0x96, 0x01]);
        // field 5, fixed64
        bytes.extend_from_slice(&[0x29, 1, 2, 3, 4, 5, 6, 7, 8]);
        // field 6, fixed32
        bytes.extend_from_slice(&[0x35, 1, 2, 3, 4]);
        // field 9, bytes (not UTF-8, never inspected)
        bytes.extend_from_slice(&[0x4A, 0x02, 0xFF, 0xFE]);
        bytes.extend_from_slice(&sample().encode());
        assert_eq!(decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_known_field_with_other_wire_type_is_skipped() {
        // field 1 as varint, then a real field 2
        let bytes = [0x08, 0x05, 0x12, 0x01, b'c'];
        let msg = decode(&bytes).unwrap();
        assert_eq!(msg.content, "");
        assert_eq!(msg.sender_id, "c");
    }

    #[test]
    fn test_unknown_groups_are_skipped() {
        // group 5 holding a varint and a nested group 6, then field 1
        let mut bytes = vec![0x2B, 0x08, 0x01, 0x33, 0x10, 0x02, 0x34, 0x2C];
        bytes.extend_from_slice(&encode("after", "", ""));
        assert_eq!(decode(&bytes).unwrap().content, "after");

        // a group on a known field number is skipped like any other mismatch
        let bytes = [0x0B, 0x0C, 0x12, 0x01, b'c'];
        assert_eq!(decode(&bytes).unwrap().sender_id, "c");
    }

    #[test]
    fn test_malformed_groups() {
        assert_eq!(
            decode(&[0x2B, 0x08, 0x01]),
            Err(DecodeError::UnterminatedGroup { field: 5 })
        );
        assert_eq!(
            decode(&[0x2B, 0x34]),
            Err(DecodeError::MismatchedEndGroup {
                expected: 5,
                found: 6
            })
        );
        assert_eq!(decode(&[0x2C]), Err(DecodeError::UnexpectedEndGroup { field: 5 }));

        let mut nested = vec![0x2B; 65];
        nested.extend(std::iter::repeat_n(0x2C, 65));
        assert_eq!(decode(&nested), Err(DecodeError::GroupTooDeep { field: 5 }));
    }

    #[test]
    fn test_last_value_wins() {
        let mut bytes = encode("first", "", "");
        bytes.extend_from_slice(&encode("second", "", ""));
        assert_eq!(decode(&bytes).unwrap().content, "second");
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(
            decode(&[0x80]),
            Err(DecodeError::TruncatedVarint { offset: 0 })
        );
        assert_eq!(decode(&[0x02, 0x00]), Err(DecodeError::InvalidFieldNumber(0)));
        for wire_type in [6u8, 7] {
            assert_eq!(
                decode(&[0x08 | wire_type]),
                Err(DecodeError::UnsupportedWireType { field: 1, wire_type })
            );
        }
        assert_eq!(
            decode(&[0x0A, 0x02, 0xC3, 0x28]),
            Err(DecodeError::InvalidUtf8 { field: 1 })
        );
        assert_eq!(
            decode(&[0x29, 1, 2]),
            Err(DecodeError::TruncatedFixed {
                field: 5,
                needed: 8,
                remaining: 2
            })
        );
        let mut overflow = vec![0x08];
        overflow.extend_from_slice(&[0xFF; 11]);
        assert_eq!(
            decode(&overflow),
            Err(DecodeError::VarintOverflow { offset: 1 })
        );
    }

    #[test]
    fn test_field_number_too_large() {
        let mut bytes = Vec::new();
        put_varint(&mut bytes, ((MAX_FIELD_NUMBER + 1) << 3) | 2);
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::InvalidFieldNumber(MAX_FIELD_NUMBER + 1))
        );
    }
}
