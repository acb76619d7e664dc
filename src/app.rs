//! The ASGI-like message contract and the per-connection application runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::scope::Scope;

/// Inbound and outbound message kinds exchanged between the core and the application.
#[derive(Debug, Clone)]
pub enum Message {
    HttpRequest { body: Vec<u8>, more_body: bool },
    HttpDisconnect,
    WebSocketConnect,
    WebSocketReceiveText(String),
    WebSocketReceiveBytes(Vec<u8>),
    WebSocketDisconnect { code: u16 },

    HttpResponseStart { status: u16, headers: Vec<(Vec<u8>, Vec<u8>)> },
    HttpResponseBody { body: Vec<u8>, more_body: bool },
    WebSocketAccept { subprotocol: Option<String> },
    WebSocketClose { code: u16 },
    WebSocketSendText(String),
    WebSocketSendBytes(Vec<u8>),
}

/// Error returned when the application tries to send after its bridge has gone away.
#[derive(Debug, thiserror::Error)]
#[error("the connection for this application task is gone")]
pub struct SendError;

/// The two callables (`receive`, `send`) bound to a single connection's inbound queue and
/// outbound channel. Single-producer/single-consumer on both sides.
pub struct AppHandle {
    inbound_rx: mpsc::Receiver<Message>,
    outbound_tx: mpsc::Sender<Message>,
    responded: Arc<AtomicBool>,
}

impl AppHandle {
    /// Awaits the next inbound message; resolves to `None` once the connection is gone.
    pub async fn receive(&mut self) -> Option<Message> {
        self.inbound_rx.recv().await
    }

    /// Submits an outbound message. Delivery order matches call order (invariant 10).
    pub async fn send(&self, message: Message) -> Result<(), SendError> {
        if matches!(message, Message::HttpResponseStart { .. }) {
            self.responded.store(true, Ordering::SeqCst);
        }
        self.outbound_tx.send(message).await.map_err(|_| SendError)
    }

    /// A clone of the outbound sender, for [`crate::debug::DebugWrap`] to synthesize a response
    /// after the wrapped application task panics.
    pub(crate) fn outbound_sender(&self) -> mpsc::Sender<Message> {
        self.outbound_tx.clone()
    }

    pub(crate) fn responded_flag(&self) -> Arc<AtomicBool> {
        self.responded.clone()
    }
}

/// Implemented once per user application. The core calls `call` once per connection with the
/// request/session [`Scope`] and a bound [`AppHandle`].
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn call(&self, scope: Scope, handle: AppHandle);
}

/// Owns the inbound queue feeding the application task and the outbound channel the Connection
/// drains onto the wire. Created once per HTTP request or once per websocket session.
pub struct AppRunner {
    inbound_tx: mpsc::Sender<Message>,
    outbound_rx: mpsc::Receiver<Message>,
    responded: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

const QUEUE_DEPTH: usize = 32;

impl AppRunner {
    pub fn spawn(app: Arc<dyn Application>, scope: Scope) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_DEPTH);
        let responded = Arc::new(AtomicBool::new(false));

        let handle = AppHandle {
            inbound_rx,
            outbound_tx,
            responded: responded.clone(),
        };

        let task = tokio::spawn(async move {
            app.call(scope, handle).await;
        });

        Self { inbound_tx, outbound_rx, responded, task }
    }

    /// Enqueues a message for the application task. Drops the message silently if the task has
    /// already exited (the queue is closed) -- the connection is tearing down either way.
    pub async fn deliver(&self, message: Message) {
        let _ = self.inbound_tx.send(message).await;
    }

    /// Awaits the next message the application wants written to the wire.
    pub async fn next_outbound(&mut self) -> Option<Message> {
        self.outbound_rx.recv().await
    }

    /// Whether `http.response.start` has already been sent on this connection.
    pub fn has_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}
