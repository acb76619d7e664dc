//! The immutable per-request context handed to the application.

use std::net::SocketAddr;

/// What kind of connection this scope describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeType {
    Http,
    WebSocket,
}

/// `http`/`https`/`ws`/`wss` — derived from the scope type and whether TLS terminated the
/// connection. This crate never terminates TLS itself (see Non-goals), so `scheme` is always
/// `http` or `ws` today, but the field stays general for an embedder that puts this crate behind
/// a TLS-terminating proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

/// Built once per request (or once per websocket session) and never mutated afterward.
#[derive(Debug, Clone)]
pub struct Scope {
    pub scope_type: ScopeType,
    pub http_version: String,
    pub server: SocketAddr,
    pub client: SocketAddr,
    pub scheme: Scheme,
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub subprotocols: Vec<String>,
}

impl Scope {
    /// Looks up a header by case-insensitive name, returning the first match in insertion
    /// order (mirrors the permissive HTTP convention of taking the first occurrence).
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| v.as_slice())
    }
}
