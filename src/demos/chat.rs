//! The example chat application: an HTML page at `GET /` and a WebSocket echo at `GET /ws`.

use async_trait::async_trait;

use crate::app::{AppHandle, Application, Message};
use crate::scope::{Scope, ScopeType};

const CHAT_HTML: &str = include_str!("../../demos/chat.html");

pub struct ChatDemo;

impl ChatDemo {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ChatDemo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Application for ChatDemo {
    async fn call(&self, scope: Scope, mut handle: AppHandle) {
        match (scope.scope_type, scope.path.as_str()) {
            (ScopeType::Http, "/") => serve_chat_page(&mut handle).await,
            (ScopeType::WebSocket, "/ws") => echo_websocket(&mut handle).await,
            (ScopeType::Http, _) => serve_not_found(&mut handle).await,
            (ScopeType::WebSocket, _) => {
                let _ = handle.send(Message::WebSocketClose { code: 1003 }).await;
            }
        }
    }
}

async fn serve_chat_page(handle: &mut AppHandle) {
    let _ = handle
        .send(Message::HttpResponseStart {
            status: 200,
            headers: vec![(b"content-type".to_vec(), b"text/html; charset=utf-8".to_vec())],
        })
        .await;
    let _ = handle
        .send(Message::HttpResponseBody { body: CHAT_HTML.as_bytes().to_vec(), more_body: false })
        .await;
}

async fn serve_not_found(handle: &mut AppHandle) {
    let _ = handle
        .send(Message::HttpResponseStart {
            status: 404,
            headers: vec![(b"content-type".to_vec(), b"text/plain; charset=utf-8".to_vec())],
        })
        .await;
    let _ = handle
        .send(Message::HttpResponseBody { body: b"Not Found".to_vec(), more_body: false })
        .await;
}

async fn echo_websocket(handle: &mut AppHandle) {
    let _ = handle.send(Message::WebSocketAccept { subprotocol: None }).await;

    loop {
        match handle.receive().await {
            Some(Message::WebSocketReceiveText(text)) => {
                let reply = format!("Message text was: {text}");
                if handle.send(Message::WebSocketSendText(reply)).await.is_err() {
                    break;
                }
            }
            Some(Message::WebSocketReceiveBytes(_)) => {
                // `encoding = "text"` in the source rejects binary frames outright; mirrored
                // here by closing with a policy violation instead of echoing raw bytes.
                let _ = handle.send(Message::WebSocketClose { code: 1008 }).await;
                break;
            }
            Some(Message::WebSocketDisconnect { .. }) | None => break,
            _ => {}
        }
    }
}
