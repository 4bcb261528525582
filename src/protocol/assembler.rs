//! Reassembly of fragmented data messages.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Collects data frames until FIN and yields the complete [`Message`].
///
/// Control frames never reach the assembler; the connection answers them
/// between fragments.
#[derive(Debug)]
pub struct MessageAssembler {
    limits: Limits,
    opcode: Option<OpCode>,
    buffer: Vec<u8>,
    fragments: usize,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            opcode: None,
            buffer: Vec::new(),
            fragments: 0,
        }
    }

    /// Feed one data frame.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for an unexpected or missing continuation
    /// - `Error::MessageTooLarge` / `Error::TooManyFragments` past the limits
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match (frame.opcode, self.opcode) {
            (op, _) if op.is_control() => {
                return Err(Error::ProtocolViolation(format!(
                    "{op} frame is not part of a data message"
                )));
            }
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (op, None) => self.opcode = Some(op),
        }

        self.fragments += 1;
        self.limits.check_fragment_count(self.fragments)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        let fin = frame.fin;
        if self.buffer.is_empty() && fin {
            // single-frame message, skip the copy
            self.buffer = frame.into_payload();
        } else {
            self.buffer.extend_from_slice(frame.payload());
        }

        if !fin {
            return Ok(None);
        }

        let payload = std::mem::take(&mut self.buffer);
        let opcode = self.opcode.take();
        self.fragments = 0;
        match opcode {
            Some(OpCode::Text) => String::from_utf8(payload)
                .map(|s| Some(Message::Text(s)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// True while a fragmented message is incomplete.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    pub fn reset(&mut self) {
        self.opcode = None;
        self.buffer.clear();
        self.fragments = 0;
    }
}
