//! Message-level WebSocket connection over an upgraded stream.
//!
//! ## Lifecycle
//!
//! 1. **Open** after the handshake
//! 2. **Closing** once we have sent a Close frame
//! 3. **Closed** when the close handshake completes or the stream ends
//! 4. **Errored** when a protocol or transport error ends the connection

mod fragmenter;
mod role;
mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
pub use role::Role;
pub use state::ConnectionState;
