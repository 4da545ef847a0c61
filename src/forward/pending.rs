//! Single-assignment response cell.
//!
//! A forwarded request resolves exactly once: the first `complete` wins and
//! later calls return `false`. If every `Completer` is dropped first, the
//! pending response resolves to 5.00 instead of hanging.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::coap::message::{CoapResponse, Code};

/// Create a linked completer / pending response pair.
pub fn channel() -> (Completer, PendingResponse) {
    let (tx, rx) = oneshot::channel();
    (
        Completer {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        PendingResponse { rx },
    )
}

/// Write side of a [`PendingResponse`]. Cheap to clone; all clones share
/// the same slot.
#[derive(Clone, Debug)]
pub struct Completer {
    slot: Arc<Mutex<Option<oneshot::Sender<CoapResponse>>>>,
}

impl Completer {
    /// Resolve the pending response. Returns `false` if it was already resolved.
    pub fn complete(&self, response: CoapResponse) -> bool {
        let sender = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        match sender {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!("Pending response dropped before completion");
                }
                true
            }
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

/// A CoAP response that will be available later.
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<CoapResponse>,
}

impl PendingResponse {
    /// An already resolved response.
    pub fn ready(response: CoapResponse) -> Self {
        let (completer, pending) = channel();
        completer.complete(response);
        pending
    }
}

impl From<oneshot::Receiver<CoapResponse>> for PendingResponse {
    fn from(rx: oneshot::Receiver<CoapResponse>) -> Self {
        Self { rx }
    }
}

impl Future for PendingResponse {
    type Output = CoapResponse;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoapResponse> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                tracing::error!("Response abandoned without completion");
                CoapResponse::new(Code::INTERNAL_SERVER_ERROR)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_completion_wins() {
        let (completer, pending) = channel();
        assert!(completer.complete(CoapResponse::new(Code::CONTENT)));
        assert!(!completer.complete(CoapResponse::new(Code::GATEWAY_TIMEOUT)));
        assert!(completer.is_completed());
        assert_eq!(pending.await.code, Code::CONTENT);
    }

    #[tokio::test]
    async fn racing_completions_resolve_once() {
        for _ in 0..50 {
            let (completer, pending) = channel();
            let tasks: Vec<_> = (0..8u8)
                .map(|i| {
                    let completer = completer.clone();
                    tokio::spawn(async move { completer.complete(CoapResponse::new(Code(64 + i))) })
                })
                .collect();

            let mut wins = 0;
            for task in tasks {
                if task.await.unwrap() {
                    wins += 1;
                }
            }
            assert_eq!(wins, 1);
            assert!(pending.await.code.is_success());
        }
    }

    #[tokio::test]
    async fn dropped_completers_resolve_to_internal_error() {
        let (completer, pending) = channel();
        let clone = completer.clone();
        drop(completer);
        drop(clone);
        assert_eq!(pending.await.code, Code::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn ready_resolves_immediately() {
        let response = PendingResponse::ready(CoapResponse::new(Code::BAD_OPTION)).await;
        assert_eq!(response.code, Code::BAD_OPTION);
    }
}
