//! Splits outgoing data messages into frames within the frame size limit.

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one outgoing message.
///
/// The first frame carries the message opcode, the rest are continuations.
/// A payload that already fits is moved into a single frame without copying.
pub(crate) struct MessageFragmenter {
    payload: Vec<u8>,
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    done: bool,
}

impl MessageFragmenter {
    pub(crate) fn new(payload: Vec<u8>, opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            fragment_size: fragment_size.max(1),
            offset: 0,
            done: false,
        }
    }

    /// Number of frames this message will be sent as.
    pub(crate) fn frame_count(&self) -> usize {
        self.payload.len().div_ceil(self.fragment_size).max(1)
    }
}

impl Iterator for MessageFragmenter {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.done {
            return None;
        }
        let opcode = if self.offset == 0 {
            self.opcode
        } else {
            OpCode::Continuation
        };

        let remaining = self.payload.len() - self.offset;
        if remaining <= self.fragment_size {
            self.done = true;
            let chunk = if self.offset == 0 {
                std::mem::take(&mut self.payload)
            } else {
                self.payload[self.offset..].to_vec()
            };
            return Some(Frame::new(true, opcode, chunk));
        }

        let end = self.offset + self.fragment_size;
        let chunk = self.payload[self.offset..end].to_vec();
        self.offset = end;
        Some(Frame::new(false, opcode, chunk))
    }
}
