//! Translates `http.response.*` application messages into wire bytes.

use crate::app::Message;
use crate::error::CoreError;
use crate::wire::{chunk, mandatory_headers, status_line};

#[derive(Debug)]
enum State {
    AwaitStart,
    AwaitFirstBody { preamble: Vec<u8>, content_length: Option<usize> },
    Streaming,
    Done,
}

pub struct HttpBridgeOutput {
    pub bytes: Vec<u8>,
    /// `Some(keep_alive)` once the response has fully been emitted.
    pub complete: Option<bool>,
}

/// One instance per HTTP request/response cycle on a connection.
pub struct HttpBridge {
    state: State,
    keep_alive: bool,
}

impl HttpBridge {
    pub fn new(keep_alive_from_request: bool) -> Self {
        Self { state: State::AwaitStart, keep_alive: keep_alive_from_request }
    }

    /// Whether the response is mid-stream (chunked body still being emitted). Used by
    /// [`crate::connection::Connection`] to report the spec's `Streaming` vs `Response` state.
    pub fn is_streaming(&self) -> bool {
        matches!(self.state, State::Streaming)
    }

    pub fn handle_app_message(&mut self, message: Message) -> Result<HttpBridgeOutput, CoreError> {
        match (std::mem::replace(&mut self.state, State::Done), message) {
            (State::AwaitStart, Message::HttpResponseStart { status, headers }) => {
                let mut content_length = None;
                let mut preamble = Vec::new();
                preamble.extend_from_slice(status_line(status).as_bytes());
                preamble.extend_from_slice(mandatory_headers().as_bytes());
                for (name, value) in &headers {
                    if name.eq_ignore_ascii_case(b"content-length") {
                        content_length = std::str::from_utf8(value)
                            .ok()
                            .and_then(|s| s.trim().parse().ok());
                    }
                    if name.eq_ignore_ascii_case(b"connection") && value.eq_ignore_ascii_case(b"close") {
                        self.keep_alive = false;
                    }
                    preamble.extend_from_slice(name);
                    preamble.extend_from_slice(b": ");
                    preamble.extend_from_slice(value);
                    preamble.extend_from_slice(b"\r\n");
                }
                self.state = State::AwaitFirstBody { preamble, content_length };
                Ok(HttpBridgeOutput { bytes: Vec::new(), complete: None })
            }

            (State::AwaitFirstBody { preamble, content_length }, Message::HttpResponseBody { body, more_body: true }) => {
                let mut out = preamble;
                out.extend_from_slice(b"transfer-encoding: chunked\r\n\r\n");
                out.extend_from_slice(&chunk(&body));
                self.state = State::Streaming;
                let _ = content_length;
                Ok(HttpBridgeOutput { bytes: out, complete: None })
            }
            (State::AwaitFirstBody { preamble, content_length }, Message::HttpResponseBody { body, more_body: false }) => {
                let mut out = preamble;
                match content_length {
                    Some(_) => out.extend_from_slice(b"\r\n"),
                    None => out.extend_from_slice(format!("content-length: {:x}\r\n\r\n", body.len()).as_bytes()),
                }
                out.extend_from_slice(&body);
                self.state = State::Done;
                Ok(HttpBridgeOutput { bytes: out, complete: Some(self.keep_alive) })
            }

            (State::Streaming, Message::HttpResponseBody { body, more_body: true }) => {
                self.state = State::Streaming;
                Ok(HttpBridgeOutput { bytes: chunk(&body), complete: None })
            }
            (State::Streaming, Message::HttpResponseBody { body, more_body: false }) => {
                let mut out = chunk(&body);
                out.extend_from_slice(b"0\r\n\r\n");
                self.state = State::Done;
                Ok(HttpBridgeOutput { bytes: out, complete: Some(self.keep_alive) })
            }

            _ => Err(CoreError::ApplicationMisbehavior(
                "http response message arrived out of order".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_response_uses_computed_content_length() {
        let mut bridge = HttpBridge::new(true);
        let out = bridge
            .handle_app_message(Message::HttpResponseStart {
                status: 200,
                headers: vec![(b"content-type".to_vec(), b"text/html".to_vec())],
            })
            .unwrap();
        assert!(out.bytes.is_empty());
        assert!(out.complete.is_none());

        let out = bridge
            .handle_app_message(Message::HttpResponseBody { body: b"<html/>".to_vec(), more_body: false })
            .unwrap();
        let wire = String::from_utf8(out.bytes).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-type: text/html\r\n"));
        assert!(wire.contains("content-length: 7\r\n\r\n<html/>"));
        assert_eq!(out.complete, Some(true));
    }

    #[test]
    fn computed_content_length_is_hex_not_decimal() {
        let mut bridge = HttpBridge::new(true);
        bridge
            .handle_app_message(Message::HttpResponseStart { status: 200, headers: vec![] })
            .unwrap();
        let body = vec![b'x'; 17];
        let out = bridge
            .handle_app_message(Message::HttpResponseBody { body, more_body: false })
            .unwrap();
        let wire = String::from_utf8(out.bytes).unwrap();
        assert!(wire.contains("content-length: 11\r\n\r\n"));
        assert!(!wire.contains("content-length: 17\r\n"));
    }

    #[test]
    fn streaming_response_uses_chunked_encoding() {
        let mut bridge = HttpBridge::new(true);
        bridge
            .handle_app_message(Message::HttpResponseStart { status: 200, headers: vec![] })
            .unwrap();
        let out = bridge
            .handle_app_message(Message::HttpResponseBody { body: b"abc".to_vec(), more_body: true })
            .unwrap();
        let wire = String::from_utf8(out.bytes).unwrap();
        assert!(wire.contains("transfer-encoding: chunked\r\n\r\n3\r\nabc\r\n"));
        assert!(out.complete.is_none());

        let out = bridge
            .handle_app_message(Message::HttpResponseBody { body: b"de".to_vec(), more_body: false })
            .unwrap();
        assert_eq!(out.bytes, b"2\r\nde\r\n0\r\n\r\n");
        assert_eq!(out.complete, Some(true));
    }

    #[test]
    fn connection_close_header_clears_keep_alive() {
        let mut bridge = HttpBridge::new(true);
        bridge
            .handle_app_message(Message::HttpResponseStart {
                status: 200,
                headers: vec![(b"connection".to_vec(), b"close".to_vec())],
            })
            .unwrap();
        let out = bridge
            .handle_app_message(Message::HttpResponseBody { body: vec![], more_body: false })
            .unwrap();
        assert_eq!(out.complete, Some(false));
    }

    #[test]
    fn body_before_start_is_application_misbehavior() {
        let mut bridge = HttpBridge::new(true);
        let err = bridge
            .handle_app_message(Message::HttpResponseBody { body: vec![], more_body: false })
            .unwrap_err();
        assert!(matches!(err, CoreError::ApplicationMisbehavior(_)));
    }
}
