//! Computes the `Sec-WebSocket-Accept` value for the upgrade handshake (RFC 6455 §1.3).

use base64::{engine::general_purpose::STANDARD, Engine};
use sha1::{Digest, Sha1};

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the accept key for a given `Sec-WebSocket-Key` header value.
pub fn accept_key(sec_websocket_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(sec_websocket_key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rfc_6455_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn matches_spec_scenario_s3() {
        assert_eq!(
            accept_key("Y56tJpDd+hCW+vDb0qdekQ=="),
            "J9R6HjgRj5VpgXEFRYnNh9igw2o="
        );
    }
}
