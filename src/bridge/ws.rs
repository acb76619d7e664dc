//! Translates `websocket.*` application messages into wire frames, and the accept/reject half
//! of the upgrade handshake (the part that depends on the application's decision).

use crate::app::Message;
use crate::error::CoreError;
use crate::frame::{FrameCodec, Opcode};
use crate::wire::mandatory_headers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubState {
    AwaitAccept,
    Open,
    Closed,
}

pub enum WsAction {
    /// Bytes to write to the wire as-is.
    Wire(Vec<u8>),
    /// The application rejected the upgrade before accepting; write these bytes then close.
    Reject(Vec<u8>),
    /// The application closed the session; write any bytes first, then close, delivering
    /// `websocket.disconnect` with this code to the application task before it is dropped.
    CloseNow(u16),
}

/// One instance per websocket session, created once the handshake's accept key has been
/// computed and the Connection has entered the Framing state.
pub struct WsBridge {
    sub_state: SubState,
    accept_key: String,
}

impl WsBridge {
    pub fn new(accept_key: String) -> Self {
        Self { sub_state: SubState::AwaitAccept, accept_key }
    }

    pub fn handle_app_message(&mut self, message: Message) -> Result<Vec<WsAction>, CoreError> {
        match (self.sub_state, message) {
            (SubState::AwaitAccept, Message::WebSocketAccept { subprotocol }) => {
                let mut headers = format!(
                    "HTTP/1.1 101 Switching Protocols\r\n{}Upgrade: WebSocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n",
                    mandatory_headers(),
                    self.accept_key
                );
                if let Some(protocol) = subprotocol {
                    headers.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
                }
                headers.push_str("\r\n");
                self.sub_state = SubState::Open;
                Ok(vec![WsAction::Wire(headers.into_bytes())])
            }

            (SubState::AwaitAccept, Message::WebSocketClose { .. }) => {
                self.sub_state = SubState::Closed;
                let body = b"Unsupported upgrade request.";
                let response = format!(
                    "HTTP/1.1 403 Forbidden\r\n{}content-length: {}\r\n\r\n",
                    mandatory_headers(),
                    body.len()
                );
                let mut bytes = response.into_bytes();
                bytes.extend_from_slice(body);
                Ok(vec![WsAction::Reject(bytes)])
            }

            (SubState::Open, Message::WebSocketSendText(text)) => {
                Ok(vec![WsAction::Wire(FrameCodec::encode(Opcode::Text, text.as_bytes()))])
            }
            (SubState::Open, Message::WebSocketSendBytes(bytes)) => {
                Ok(vec![WsAction::Wire(FrameCodec::encode(Opcode::Binary, &bytes))])
            }
            (SubState::Open, Message::WebSocketClose { code }) => {
                self.sub_state = SubState::Closed;
                Ok(vec![
                    WsAction::Wire(FrameCodec::encode_close(code, "")),
                    WsAction::CloseNow(code),
                ])
            }

            (sub_state, _) => Err(CoreError::ApplicationMisbehavior(format!(
                "unexpected websocket message in state {sub_state:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_emits_101_with_accept_key() {
        let mut bridge = WsBridge::new("J9R6HjgRj5VpgXEFRYnNh9igw2o=".into());
        let actions = bridge
            .handle_app_message(Message::WebSocketAccept { subprotocol: None })
            .unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            WsAction::Wire(bytes) => {
                let text = String::from_utf8(bytes.clone()).unwrap();
                assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
                assert!(text.contains("Sec-WebSocket-Accept: J9R6HjgRj5VpgXEFRYnNh9igw2o=\r\n"));
            }
            _ => panic!("expected Wire action"),
        }
    }

    #[test]
    fn subprotocol_is_echoed_back_when_supplied() {
        let mut bridge = WsBridge::new("key".into());
        let actions = bridge
            .handle_app_message(Message::WebSocketAccept { subprotocol: Some("chat".into()) })
            .unwrap();
        match &actions[0] {
            WsAction::Wire(bytes) => {
                assert!(String::from_utf8_lossy(bytes).contains("Sec-WebSocket-Protocol: chat\r\n"));
            }
            _ => panic!("expected Wire action"),
        }
    }

    #[test]
    fn send_before_accept_is_application_misbehavior() {
        let mut bridge = WsBridge::new("key".into());
        let err = bridge
            .handle_app_message(Message::WebSocketSendText("hi".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::ApplicationMisbehavior(_)));
    }

    #[test]
    fn close_in_open_state_emits_close_frame_and_close_now() {
        let mut bridge = WsBridge::new("key".into());
        bridge.handle_app_message(Message::WebSocketAccept { subprotocol: None }).unwrap();
        let actions = bridge.handle_app_message(Message::WebSocketClose { code: 1000 }).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[1], WsAction::CloseNow(1000)));
    }
}
