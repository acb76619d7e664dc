//! Protocol-specific adapters between the connection state machine and the application message
//! stream. A tagged variant rather than a trait-object hierarchy: the Connection always knows
//! which protocol it is bridging for, so dynamic dispatch buys nothing here.

pub mod http;
pub mod ws;

pub use http::{HttpBridge, HttpBridgeOutput};
pub use ws::{WsAction, WsBridge};
