//! Error kinds for the protocol core.
//!
//! Parser and codec failures surface as a [`CoreError`]; the [`Connection`](crate::connection)
//! decides the wire response and, where relevant, the [`CloseCode`] to send before dropping the
//! transport.

use thiserror::Error;

/// RFC 6455 §7.4.1 close codes used by this crate. Only the subset the core ever emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    Normal = 1000,
    GoingAway = 1001,
    ProtocolError = 1002,
    Unsupported = 1003,
    InvalidPayloadData = 1007,
    PolicyViolation = 1008,
    MessageTooBig = 1009,
    InternalError = 1011,
}

impl CloseCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// The named failure modes from the error-handling design: every condition reachable from bytes
/// off the wire or from application misbehavior must be one of these. The core never panics on
/// peer input.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed HTTP request: {0}")]
    ParseError(String),

    #[error("unsupported upgrade target: {0}")]
    UnsupportedUpgrade(String),

    #[error("upgrade request missing Sec-WebSocket-Key")]
    MissingWebSocketKey,

    #[error("websocket protocol violation: {0}")]
    WebSocketProtocolError(String),

    #[error("invalid payload data: {0}")]
    InvalidPayloadData(String),

    #[error("message too big: {size} bytes exceeds limit of {limit}")]
    MessageTooBig { size: u64, limit: usize },

    #[error("application misbehavior: {0}")]
    ApplicationMisbehavior(String),

    #[error("transport lost: {0}")]
    TransportLost(#[from] std::io::Error),
}

impl CoreError {
    /// The close code this error should be reported with, for the errors that reach the
    /// WebSocket framing layer. HTTP-layer errors (before any upgrade) have no close code.
    pub fn close_code(&self) -> CloseCode {
        match self {
            CoreError::WebSocketProtocolError(_) => CloseCode::ProtocolError,
            CoreError::InvalidPayloadData(_) => CloseCode::InvalidPayloadData,
            CoreError::MessageTooBig { .. } => CloseCode::MessageTooBig,
            CoreError::ApplicationMisbehavior(_) => CloseCode::InternalError,
            _ => CloseCode::ProtocolError,
        }
    }

    /// The HTTP status this error should be reported with, for errors raised before any upgrade
    /// or response has started.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::ParseError(_) => 400,
            CoreError::UnsupportedUpgrade(_) => 500,
            CoreError::MissingWebSocketKey => 403,
            CoreError::ApplicationMisbehavior(_) => 500,
            _ => 500,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
