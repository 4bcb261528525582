//! Configuration and limits for WebSocket connections.

use crate::error::{Error, Result};

/// Resource limits for WebSocket connections.
///
/// These bound the memory a single peer can make the server allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame payload in bytes.
    ///
    /// Default: 16 MB
    pub max_frame_size: usize,

    /// Maximum size of a complete message after reassembling fragments.
    ///
    /// Default: 64 MB
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the HTTP handshake response read by clients.
    ///
    /// Default: 8 KB
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`] if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            Err(Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// WebSocket connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Accept unmasked frames from clients (server only).
    ///
    /// RFC 6455 requires clients to mask all frames.
    ///
    /// Default: false
    pub accept_unmasked_frames: bool,

    /// Read buffer size (in bytes).
    ///
    /// Default: 4 KB
    pub read_buffer_size: usize,

    /// Write buffer size (in bytes).
    ///
    /// Default: 4 KB
    pub write_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            accept_unmasked_frames: false,
            read_buffer_size: 4096,
            write_buffer_size: 4096,
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration preset for the server side of a connection.
    #[must_use]
    pub fn server() -> Self {
        Self::default()
    }

    /// Configuration preset for the client side of a connection.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Cap the size of reassembled messages.
    ///
    /// The frame limit is lowered to match when it is larger.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.limits.max_message_size = size;
        self.limits.max_frame_size = self.limits.max_frame_size.min(size);
        self
    }

    /// Accept unmasked client frames (non-compliant, for tooling only).
    #[must_use]
    pub fn with_accept_unmasked_frames(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Set read buffer size.
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set write buffer size.
    #[must_use]
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = Limits::default();
        assert_eq!(limits.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(limits.max_message_size, 64 * 1024 * 1024);
        assert_eq!(limits.max_fragment_count, 128);
        assert_eq!(limits.max_handshake_size, 8192);
    }

    #[test]
    fn test_limits_checks() {
        let limits = Limits::new(10, 20, 2, 30);
        assert!(limits.check_frame_size(10).is_ok());
        assert!(matches!(
            limits.check_frame_size(11),
            Err(Error::FrameTooLarge { size: 11, max: 10 })
        ));
        assert!(limits.check_message_size(20).is_ok());
        assert!(limits.check_message_size(21).is_err());
        assert!(limits.check_fragment_count(2).is_ok());
        assert!(limits.check_fragment_count(3).is_err());
        assert!(matches!(
            limits.check_handshake_size(31),
            Err(Error::HandshakeTooLarge { .. })
        ));
    }

    #[test]
    fn test_config_presets() {
        let server = Config::server();
        assert!(!server.accept_unmasked_frames);
        assert_eq!(server.read_buffer_size, 4096);

        let client = Config::client();
        assert_eq!(client.limits, Limits::default());
    }

    #[test]
    fn test_with_max_message_size_lowers_frame_limit() {
        let config = Config::new().with_max_message_size(1024);
        assert_eq!(config.limits.max_message_size, 1024);
        assert_eq!(config.limits.max_frame_size, 1024);

        let config = Config::new()
            .with_limits(Limits::new(512, 4096, 8, 8192))
            .with_max_message_size(2048);
        assert_eq!(config.limits.max_frame_size, 512);
    }

    #[test]
    fn test_config_buffer_size() {
        let config = Config::new()
            .with_read_buffer_size(1024)
            .with_write_buffer_size(2048);

        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.write_buffer_size, 2048);
    }
}
