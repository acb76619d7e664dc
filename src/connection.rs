//! The per-connection state machine: owns the transport, the active parser, the active bridge,
//! and the backpressure latch between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::app::{AppRunner, Application, Message};
use crate::bridge::{HttpBridge, WsAction, WsBridge};
use crate::error::CoreError;
use crate::frame::{Frame, FrameCodec, Opcode};
use crate::handshake;
use crate::header::{HeaderParser, UpgradeFlag};
use crate::limits::ServerLimits;
use crate::scope::{Scheme, Scope, ScopeType};
use crate::transport::ByteTransport;
use crate::wire::{mandatory_headers, status_line};

/// The spec's five protocol states, reported for diagnostics and tests. Internally this maps
/// onto [`Active`], which additionally owns the objects each state needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Request,
    Response,
    Streaming,
    Framing,
    Closed,
}

enum Active {
    AwaitRequest(HeaderParser),
    Http(HttpBridge, AppRunner),
    Ws(FrameCodec, WsBridge, AppRunner),
    Done,
}

/// Single-waiter backpressure signal: set means writable, cleared means paused. The shipped TCP
/// transport (`SplitTransport`) has no OS-level watermark callback, so this crate approximates
/// it by pausing around every write and resuming once it completes -- a real transport that
/// offers high/low watermark callbacks can drive the same latch directly.
struct DrainLatch {
    paused: AtomicBool,
    notify: Notify,
}

impl DrainLatch {
    fn new() -> Self {
        Self { paused: AtomicBool::new(false), notify: Notify::new() }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait_for_drain(&self) {
        while self.paused.load(Ordering::SeqCst) {
            self.notify.notified().await;
        }
    }
}

pub struct Connection {
    transport: Box<dyn ByteTransport>,
    limits: ServerLimits,
    app: Arc<dyn Application>,
    active: Active,
    drain: Arc<DrainLatch>,
}

impl Connection {
    pub fn new(transport: Box<dyn ByteTransport>, limits: ServerLimits, app: Arc<dyn Application>) -> Self {
        let active = Active::AwaitRequest(HeaderParser::new(limits.clone()));
        Self { transport, limits, app, active, drain: Arc::new(DrainLatch::new()) }
    }

    pub fn protocol_state(&self) -> ProtocolState {
        match &self.active {
            Active::AwaitRequest(_) => ProtocolState::Request,
            Active::Http(bridge, _) if bridge.is_streaming() => ProtocolState::Streaming,
            Active::Http(..) => ProtocolState::Response,
            Active::Ws(..) => ProtocolState::Framing,
            Active::Done => ProtocolState::Closed,
        }
    }

    /// Drives this connection to completion: reads transport bytes, feeds the active parser,
    /// and relays the application's outbound messages back onto the wire, until the connection
    /// closes.
    pub async fn drive(mut self) {
        let mut buf = vec![0u8; 8192];

        loop {
            if matches!(self.active, Active::Done) {
                break;
            }

            tokio::select! {
                read_result = self.transport.read(&mut buf) => {
                    match read_result {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if let Err(err) = self.on_bytes(&buf[..n]).await {
                                self.report_and_close(err).await;
                                break;
                            }
                        }
                    }
                }
                outbound = Self::poll_outbound(&mut self.active) => {
                    if let Some(msg) = outbound {
                        if let Err(err) = self.on_app_message(msg).await {
                            self.report_and_close(err).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn poll_outbound(active: &mut Active) -> Option<Message> {
        match active {
            Active::Http(_, runner) => runner.next_outbound().await,
            Active::Ws(_, _, runner) => runner.next_outbound().await,
            _ => std::future::pending().await,
        }
    }

    async fn on_bytes(&mut self, data: &[u8]) -> Result<(), CoreError> {
        if matches!(self.active, Active::AwaitRequest(_)) {
            return self.feed_header_parser(data).await;
        }
        if matches!(self.active, Active::Ws(..)) {
            return self.feed_frame_codec(data).await;
        }
        // Pipelining / request bodies mid-response are out of scope; bytes arriving while a
        // response is in flight are a protocol violation rather than silently buffered.
        Err(CoreError::ParseError("unexpected bytes for current connection state".into()))
    }

    async fn feed_header_parser(&mut self, data: &[u8]) -> Result<(), CoreError> {
        let became_complete = if let Active::AwaitRequest(parser) = &mut self.active {
            parser.feed(data)?;
            parser.is_complete()
        } else {
            unreachable!("feed_header_parser called outside AwaitRequest")
        };

        if became_complete {
            self.on_headers_complete().await?;
        }
        Ok(())
    }

    async fn feed_frame_codec(&mut self, data: &[u8]) -> Result<(), CoreError> {
        let frames = if let Active::Ws(codec, _, _) = &mut self.active {
            codec.decode(data)?
        } else {
            unreachable!("feed_frame_codec called outside Ws")
        };

        for frame in frames {
            self.handle_frame(frame).await?;
        }
        Ok(())
    }

    async fn on_headers_complete(&mut self) -> Result<(), CoreError> {
        let parser = match std::mem::replace(&mut self.active, Active::Done) {
            Active::AwaitRequest(parser) => parser,
            other => {
                self.active = other;
                return Ok(());
            }
        };

        let keep_alive = keep_alive_from_headers(parser.headers());
        let headers: Vec<(Vec<u8>, Vec<u8>)> = parser
            .headers()
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        let local = self.transport.local_addr();
        let peer = self.transport.peer_addr();

        if parser.upgrade_flag() == UpgradeFlag::Yes {
            let target_is_websocket = parser
                .upgrade_target()
                .map(|(_, value)| value.eq_ignore_ascii_case(b"websocket"))
                .unwrap_or(false);

            if !target_is_websocket {
                let requested = parser
                    .upgrade_target()
                    .map(|(_, value)| String::from_utf8_lossy(value).into_owned())
                    .unwrap_or_default();
                return Err(CoreError::UnsupportedUpgrade(requested));
            }

            let key = headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(b"sec-websocket-key"))
                .map(|(_, value)| value.clone());

            let key = match key {
                Some(key) => key,
                None => return Err(CoreError::MissingWebSocketKey),
            };

            let accept = handshake::accept_key(&String::from_utf8_lossy(&key));
            let subprotocols = headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(b"sec-websocket-protocol"))
                .map(|(_, value)| {
                    String::from_utf8_lossy(value)
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .collect()
                })
                .unwrap_or_default();

            let scope = Scope {
                scope_type: ScopeType::WebSocket,
                http_version: parser.version().to_string(),
                server: local,
                client: peer,
                scheme: Scheme::Ws,
                method: parser.method().to_string(),
                path: parser.path().to_string(),
                query_string: parser.query().to_string(),
                headers,
                subprotocols,
            };

            let runner = AppRunner::spawn(self.app.clone(), scope);
            runner.deliver(Message::WebSocketConnect).await;

            self.active = Active::Ws(FrameCodec::new(self.limits.clone()), WsBridge::new(accept), runner);
            return Ok(());
        }

        let scope = Scope {
            scope_type: ScopeType::Http,
            http_version: parser.version().to_string(),
            server: local,
            client: peer,
            scheme: Scheme::Http,
            method: parser.method().to_string(),
            path: parser.path().to_string(),
            query_string: parser.query().to_string(),
            headers,
            subprotocols: Vec::new(),
        };

        let runner = AppRunner::spawn(self.app.clone(), scope);
        runner.deliver(Message::HttpRequest { body: Vec::new(), more_body: false }).await;

        self.active = Active::Http(HttpBridge::new(keep_alive), runner);
        Ok(())
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), CoreError> {
        match frame.opcode {
            Opcode::Text => {
                let text = String::from_utf8(frame.payload)
                    .map_err(|_| CoreError::InvalidPayloadData("text frame payload is not valid UTF-8".into()))?;
                if let Active::Ws(_, _, runner) = &self.active {
                    runner.deliver(Message::WebSocketReceiveText(text)).await;
                }
                Ok(())
            }
            Opcode::Binary => {
                if let Active::Ws(_, _, runner) = &self.active {
                    runner.deliver(Message::WebSocketReceiveBytes(frame.payload)).await;
                }
                Ok(())
            }
            Opcode::Ping => {
                let pong = FrameCodec::encode(Opcode::Pong, &frame.payload);
                self.write_bytes(&pong).await.map_err(CoreError::TransportLost)
            }
            Opcode::Pong => Ok(()),
            Opcode::Close => {
                let code = close_code_from_payload(&frame.payload);
                let echo = FrameCodec::encode_close(code, "");
                self.write_bytes(&echo).await.map_err(CoreError::TransportLost)?;
                if let Active::Ws(_, _, runner) = &self.active {
                    runner.deliver(Message::WebSocketDisconnect { code }).await;
                }
                self.active = Active::Done;
                Ok(())
            }
            Opcode::Continuation => Err(CoreError::WebSocketProtocolError(
                "continuation frames are not supported".into(),
            )),
        }
    }

    async fn on_app_message(&mut self, msg: Message) -> Result<(), CoreError> {
        enum Effect {
            Http(crate::bridge::HttpBridgeOutput),
            Ws(Vec<WsAction>),
        }

        let effect = match &mut self.active {
            Active::Http(bridge, _) => Effect::Http(bridge.handle_app_message(msg)?),
            Active::Ws(_, bridge, _) => Effect::Ws(bridge.handle_app_message(msg)?),
            _ => {
                return Err(CoreError::ApplicationMisbehavior(
                    "application message arrived with no active bridge".into(),
                ));
            }
        };

        match effect {
            Effect::Http(output) => {
                if !output.bytes.is_empty() {
                    self.write_bytes(&output.bytes).await.map_err(CoreError::TransportLost)?;
                }
                if let Some(keep_alive) = output.complete {
                    self.finish_http_response(keep_alive).await;
                }
            }
            Effect::Ws(actions) => {
                for action in actions {
                    match action {
                        WsAction::Wire(bytes) => {
                            self.write_bytes(&bytes).await.map_err(CoreError::TransportLost)?
                        }
                        WsAction::Reject(bytes) => {
                            self.write_bytes(&bytes).await.map_err(CoreError::TransportLost)?;
                            self.active = Active::Done;
                        }
                        WsAction::CloseNow(code) => {
                            if let Active::Ws(_, _, runner) =
                                std::mem::replace(&mut self.active, Active::Done)
                            {
                                runner.deliver(Message::WebSocketDisconnect { code }).await;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn finish_http_response(&mut self, keep_alive: bool) {
        if let Active::Http(_, runner) = std::mem::replace(&mut self.active, Active::Done) {
            runner.deliver(Message::HttpDisconnect).await;
        }
        if keep_alive {
            self.active = Active::AwaitRequest(HeaderParser::new(self.limits.clone()));
        }
    }

    async fn report_and_close(&mut self, err: CoreError) {
        tracing::warn!(error = %err, "closing connection after protocol error");

        match &err {
            // Raised by `on_headers_complete` after it has already replaced `self.active` with
            // `Active::Done`, so these always get a response regardless of the current state.
            CoreError::UnsupportedUpgrade(_) | CoreError::MissingWebSocketKey => {
                let body = err.to_string().into_bytes();
                let response = build_error_response(err.http_status(), &body);
                let _ = self.write_bytes(&response).await;
            }
            CoreError::ParseError(_) if matches!(self.active, Active::AwaitRequest(_)) => {
                let body = err.to_string().into_bytes();
                let response = build_error_response(err.http_status(), &body);
                let _ = self.write_bytes(&response).await;
            }
            _ if matches!(self.active, Active::Ws(..)) => {
                let close = FrameCodec::encode_close(err.close_code().as_u16(), "");
                let _ = self.write_bytes(&close).await;
            }
            _ => {}
        }

        self.active = Active::Done;
    }

    async fn write_bytes(&mut self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.drain.wait_for_drain().await;
        self.drain.pause();
        let result = self.transport.write_all(data).await;
        self.drain.resume();
        result
    }
}

fn keep_alive_from_headers(headers: &[(Vec<u8>, Vec<u8>)]) -> bool {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(b"connection"))
        .map(|(_, value)| !value.to_ascii_lowercase().split(|&b| b == b',').any(|p| trim(p) == b"close"))
        .unwrap_or(true)
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &bytes[start..end]
}

fn close_code_from_payload(payload: &[u8]) -> u16 {
    if payload.len() >= 2 {
        u16::from_be_bytes([payload[0], payload[1]])
    } else {
        1000
    }
}

fn build_error_response(status: u16, body: &[u8]) -> Vec<u8> {
    let mut out = status_line(status).into_bytes();
    out.extend_from_slice(mandatory_headers().as_bytes());
    out.extend_from_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}
