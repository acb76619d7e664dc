//! Centralized parser/codec size limits with explicit state tracking.
//!
//! Tracks whether each parameter has been explicitly set or should fall back to its default.
//! The defaults are generous enough for ordinary traffic while still bounding memory use per
//! connection.

use std::time::Duration;

const DEFAULT_MAX_REQUEST_LINE: usize = 8 * 1024;
const DEFAULT_MAX_HEADER_BLOCK: usize = 64 * 1024;
const DEFAULT_MAX_HEADERS: usize = 100;
const DEFAULT_MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Size and timing limits consulted by [`crate::header::HeaderParser`],
/// [`crate::frame::FrameCodec`] and [`crate::listener::Listener`].
#[derive(Debug, Clone)]
pub struct ServerLimits {
    max_request_line: Option<usize>,
    max_header_block: Option<usize>,
    max_headers: Option<usize>,
    max_frame_payload: Option<usize>,
    idle_timeout: Option<Duration>,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLimits {
    pub fn new() -> Self {
        Self {
            max_request_line: None,
            max_header_block: None,
            max_headers: None,
            max_frame_payload: None,
            idle_timeout: None,
        }
    }

    pub fn max_request_line(&self) -> usize {
        self.max_request_line.unwrap_or(DEFAULT_MAX_REQUEST_LINE)
    }

    pub fn set_max_request_line(&mut self, value: usize) -> &mut Self {
        self.max_request_line = Some(value);
        self
    }

    pub fn max_header_block(&self) -> usize {
        self.max_header_block.unwrap_or(DEFAULT_MAX_HEADER_BLOCK)
    }

    pub fn set_max_header_block(&mut self, value: usize) -> &mut Self {
        self.max_header_block = Some(value);
        self
    }

    pub fn max_headers(&self) -> usize {
        self.max_headers.unwrap_or(DEFAULT_MAX_HEADERS)
    }

    pub fn set_max_headers(&mut self, value: usize) -> &mut Self {
        self.max_headers = Some(value);
        self
    }

    pub fn max_frame_payload(&self) -> usize {
        self.max_frame_payload.unwrap_or(DEFAULT_MAX_FRAME_PAYLOAD)
    }

    pub fn set_max_frame_payload(&mut self, value: usize) -> &mut Self {
        self.max_frame_payload = Some(value);
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT)
    }

    pub fn set_idle_timeout(&mut self, value: Duration) -> &mut Self {
        self.idle_timeout = Some(value);
        self
    }
}
