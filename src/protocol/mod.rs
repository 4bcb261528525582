//! WebSocket protocol core (RFC 6455).

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use assembler::MessageAssembler;
pub use frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
pub use handshake::{
    HandshakeRequest, HandshakeResponse, WS_GUID, client_request, compute_accept_key,
    generate_key, is_upgrade_request,
};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
