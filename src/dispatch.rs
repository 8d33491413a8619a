//! Per-request fan-out to the registered handlers.
//!
//! A transport receives a [`Dispatcher`] when it is started and calls
//! [`Dispatcher::dispatch`] once per inbound request. Dispatches for
//! different requests may run concurrently; within one dispatch the handlers
//! run one after another in registration order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::handler::{HandlerRegistry, Responder};
use crate::model::RpcServerRequest;
use crate::transport::Transport;

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Handlers that were invoked.
    pub invoked: usize,
    /// Invoked handlers that returned an error or panicked.
    pub failed: usize,
}

struct DispatchInner {
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn Transport>,
    /// Cleared once the transport has been stopped.
    accepting: AtomicBool,
}

/// Entry point a transport uses to hand over inbound requests.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatchInner>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry` that replies through `transport`.
    ///
    /// A new dispatcher refuses requests until the server starts listening.
    pub(crate) fn new(registry: Arc<HandlerRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                registry,
                transport,
                accepting: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn set_accepting(&self, accepting: bool) {
        self.inner.accepting.store(accepting, Ordering::Release);
    }

    /// Whether new requests are currently dispatched.
    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Deliver `request` to every handler registered right now.
    ///
    /// Each handler runs on its own task and is awaited before the next one
    /// starts. A handler that errors or panics is logged and skipped over;
    /// the remaining handlers still run.
    pub async fn dispatch(&self, request: RpcServerRequest) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        if !self.is_accepting() {
            tracing::debug!(rid = %request.rid, "Server not accepting, dropping request");
            return summary;
        }

        let handlers = self.inner.registry.snapshot();

        for (index, handler) in handlers.into_iter().enumerate() {
            let responder = Responder::new(&request, self.inner.transport.clone());
            let task = tokio::spawn(handler.call(request.clone(), responder));
            summary.invoked += 1;

            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    summary.failed += 1;
                    tracing::error!(
                        rid = %request.rid,
                        key = %request.key,
                        handler = index,
                        "Request handler failed: {}",
                        e
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        rid = %request.rid,
                        key = %request.key,
                        handler = index,
                        "Request handler aborted: {}",
                        e
                    );
                }
            }
        }

        summary
    }
}
