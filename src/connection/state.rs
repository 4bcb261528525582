/// Lifecycle of an upgraded WebSocket connection.
///
/// The connecting phase is the HTTP upgrade itself, handled by the server's
/// upgrade route and by [`crate::client::connect`]. A [`Connection`] only
/// exists once that has succeeded, so it starts `Open`.
///
/// [`Connection`]: crate::connection::Connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    #[default]
    Open,
    /// We sent a Close frame and are waiting for the peer's.
    Closing,
    /// Close handshake finished or the stream ended.
    Closed,
    /// A protocol or transport error ended the connection.
    Errored,
}

impl ConnectionState {
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_open() {
        assert_eq!(ConnectionState::default(), ConnectionState::Open);
    }

    #[test]
    fn test_capabilities_per_state() {
        use ConnectionState::*;
        let table = [
            (Open, true, true),
            (Closing, false, true),
            (Closed, false, false),
            (Errored, false, false),
        ];
        for (state, send, receive) in table {
            assert_eq!(state.can_send(), send, "{state}");
            assert_eq!(state.can_receive(), receive, "{state}");
        }
    }
}
