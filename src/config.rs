//! Tunables shared by the acceptor and every socket it produces.

/// Configuration for upgraded WebSocket connections.
///
/// # Examples
///
/// ```
/// use http_websocket::WebSocketConfig;
///
/// let config = WebSocketConfig::default()
///     .with_queue_capacity(64)
///     .with_max_message_size(Some(1 << 20));
///
/// assert_eq!(config.queue_capacity, 64);
/// assert!(config.auto_pong);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Depth of the hand-off queue between the HTTP layer and the consumer.
    ///
    /// A full queue blocks further upgrades, so this doubles as an admission
    /// control knob. A depth of 1 serializes connection establishment across
    /// the whole service.
    pub queue_capacity: usize,
    /// Initial capacity of each socket's read buffer
    pub read_buffer_size: usize,
    /// Largest accepted frame payload, `None` for no limit
    pub max_frame_size: Option<usize>,
    /// Largest accepted reassembled message, `None` for no limit
    pub max_message_size: Option<usize>,
    /// Reply to pings with pongs while receiving messages
    pub auto_pong: bool,
    /// Send a close frame before tearing down on a protocol error
    pub close_on_protocol_error: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            read_buffer_size: 8192,
            max_frame_size: Some(16 << 20),
            max_message_size: Some(64 << 20),
            auto_pong: true,
            close_on_protocol_error: true,
        }
    }
}

impl WebSocketConfig {
    /// Set the acceptor queue depth (clamped to at least 1)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the initial read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the frame payload limit
    pub fn with_max_frame_size(mut self, size: Option<usize>) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the message size limit
    pub fn with_max_message_size(mut self, size: Option<usize>) -> Self {
        self.max_message_size = size;
        self
    }

    /// Enable or disable automatic pong replies
    pub fn with_auto_pong(mut self, enabled: bool) -> Self {
        self.auto_pong = enabled;
        self
    }

    /// Enable or disable the close frame sent on protocol errors
    pub fn with_close_on_protocol_error(mut self, enabled: bool) -> Self {
        self.close_on_protocol_error = enabled;
        self
    }
}
