//! Small helpers for composing the bytes every response shares.

use std::time::SystemTime;

pub const SERVER_NAME: &str = "skein";

pub fn status_line(status: u16) -> String {
    let reason = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    format!("HTTP/1.1 {status} {reason}\r\n")
}

/// The mandatory `server:`/`date:` headers every response (including the handshake) must carry.
pub fn mandatory_headers() -> String {
    format!(
        "server: {SERVER_NAME}\r\ndate: {}\r\n",
        httpdate::fmt_http_date(SystemTime::now())
    )
}

pub fn chunk(body: &[u8]) -> Vec<u8> {
    let mut out = format!("{:x}\r\n", body.len()).into_bytes();
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
    out
}
