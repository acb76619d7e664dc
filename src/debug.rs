//! Optional wrapper that turns an application-task panic into a diagnostic HTTP response,
//! mirroring the source's debug-mode `ServerErrorMiddleware` wrapping.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use crate::app::{Application, Message};
use crate::scope::{Scope, ScopeType};

/// Wraps an [`Application`]; when enabled and the wrapped task panics before
/// `http.response.start` has gone out, synthesizes a 500 response carrying the panic message.
/// If the response has already started, or the scope is a websocket session, the panic is only
/// logged -- there is nothing left to rewrite.
pub struct DebugWrap {
    inner: Arc<dyn Application>,
}

impl DebugWrap {
    pub fn new(inner: Arc<dyn Application>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Application for DebugWrap {
    async fn call(&self, scope: Scope, handle: crate::app::AppHandle) {
        let outbound = handle.outbound_sender();
        let responded = handle.responded_flag();
        let scope_type = scope.scope_type;
        let inner = self.inner.clone();

        let outcome = AssertUnwindSafe(inner.call(scope, handle)).catch_unwind().await;

        if let Err(panic) = outcome {
            let message = panic_message(&panic);
            tracing::error!(error = %message, "application task panicked");

            if scope_type == ScopeType::Http && !responded.load(Ordering::SeqCst) {
                let body = format!("Internal Server Error\n\n{message}").into_bytes();
                let _ = outbound
                    .send(Message::HttpResponseStart {
                        status: 500,
                        headers: vec![(b"content-type".to_vec(), b"text/plain; charset=utf-8".to_vec())],
                    })
                    .await;
                let _ = outbound.send(Message::HttpResponseBody { body, more_body: false }).await;
            }
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "application task panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppHandle, AppRunner, Message};
    use crate::scope::{Scheme, Scope, ScopeType};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn scope(scope_type: ScopeType) -> Scope {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000);
        Scope {
            scope_type,
            http_version: "HTTP/1.1".to_string(),
            server: addr,
            client: addr,
            scheme: Scheme::Http,
            method: "GET".to_string(),
            path: "/".to_string(),
            query_string: String::new(),
            headers: Vec::new(),
            subprotocols: Vec::new(),
        }
    }

    struct PanicsBeforeResponse;

    #[async_trait]
    impl Application for PanicsBeforeResponse {
        async fn call(&self, _scope: Scope, _handle: AppHandle) {
            panic!("boom");
        }
    }

    struct PanicsAfterResponse;

    #[async_trait]
    impl Application for PanicsAfterResponse {
        async fn call(&self, _scope: Scope, handle: AppHandle) {
            let _ = handle.send(Message::HttpResponseStart { status: 200, headers: vec![] }).await;
            panic!("boom after response start");
        }
    }

    #[tokio::test]
    async fn panic_before_response_synthesizes_500() {
        let wrapped = DebugWrap::new(Arc::new(PanicsBeforeResponse));
        let mut runner = AppRunner::spawn(Arc::new(wrapped), scope(ScopeType::Http));

        match runner.next_outbound().await {
            Some(Message::HttpResponseStart { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected: {other:?}"),
        }
        match runner.next_outbound().await {
            Some(Message::HttpResponseBody { body, .. }) => {
                assert!(String::from_utf8(body).unwrap().contains("boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_after_response_start_does_not_double_respond() {
        let wrapped = DebugWrap::new(Arc::new(PanicsAfterResponse));
        let mut runner = AppRunner::spawn(Arc::new(wrapped), scope(ScopeType::Http));

        assert!(matches!(runner.next_outbound().await, Some(Message::HttpResponseStart { .. })));
        assert!(runner.join().await.is_ok());
    }
}
