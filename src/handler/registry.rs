//! Ordered registry of request handlers.
//!
//! Handlers run in registration order. Registering the same handler twice
//! is allowed and makes it run twice per request. Every registration gets
//! its own [`HandlerId`]; removal by id or by handler identity deletes one
//! entry (the earliest match) and leaves the order of the rest untouched.
//!
//! Dispatch never iterates the live list. It works on a [`snapshot`]
//! copied when the dispatch begins, so adds and removes only affect
//! requests dispatched afterwards.
//!
//! [`snapshot`]: HandlerRegistry::snapshot

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::Responder;
use crate::error::Result;
use crate::model::RpcServerRequest;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for request handlers.
pub trait RequestHandler: Send + Sync + 'static {
    /// Process one request, optionally replying through `responder`.
    fn call(&self, request: RpcServerRequest, responder: Responder)
        -> BoxFuture<'static, HandlerResult>;
}

/// Adapter turning an async closure into a [`RequestHandler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(RpcServerRequest, Responder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(RpcServerRequest, Responder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> RequestHandler for FnHandler<F, Fut>
where
    F: Fn(RpcServerRequest, Responder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        request: RpcServerRequest,
        responder: Responder,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(request, responder))
    }
}

/// Token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }
}

struct HandlerEntry {
    id: HandlerId,
    handler: Arc<dyn RequestHandler>,
}

/// Concurrency-safe ordered list of handlers.
pub struct HandlerRegistry {
    entries: RwLock<Vec<HandlerEntry>>,
    /// Next id to hand out (0 is never used).
    next_id: AtomicU64,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a handler. It sees every dispatch that starts after this returns.
    pub fn add(&self, handler: Arc<dyn RequestHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(HandlerEntry { id, handler });
        id
    }

    /// Remove the registration with the given id. Returns `false` if absent.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write();
        match entries.iter().position(|e| e.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the earliest registration of this exact handler instance.
    pub fn remove_handler(&self, handler: &Arc<dyn RequestHandler>) -> bool {
        let target = Arc::as_ptr(handler) as *const ();
        let mut entries = self.entries.write();
        match entries
            .iter()
            .position(|e| Arc::as_ptr(&e.handler) as *const () == target)
        {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Copy of the current handler list, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn RequestHandler>> {
        self.entries
            .read()
            .iter()
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    /// Ids of the current registrations, in registration order.
    pub fn ids(&self) -> Vec<HandlerId> {
        self.entries.read().iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
