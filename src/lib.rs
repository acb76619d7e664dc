//! An experimental application server core multiplexing HTTP/1.1 and RFC 6455 WebSocket framing
//! over a single connection, driving an ASGI-like user application.

pub mod app;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod debug;
pub mod demos;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod header;
pub mod limits;
pub mod listener;
pub mod logging;
pub mod registry;
pub mod scope;
pub mod transport;
pub mod wire;
