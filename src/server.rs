//! Server builder and lifecycle.
//!
//! The [`ServerBuilder`] provides a fluent API for configuring the announce
//! period and initial handlers. The [`PeerRpcServer`] manages the lifecycle:
//! 1. Record the service identity
//! 2. Start the transport, handing it a [`Dispatcher`]
//! 3. Announce the identity immediately and then once per period
//! 4. On close: stop announcing, stop the transport, drop all handlers
//!
//! # Example
//!
//! ```ignore
//! use peer_rpc::PeerRpcServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = PeerRpcServer::builder()
//!         .handler(|req, res| async move { res.reply(&req.payload).await })
//!         .build(directory, transport)?;
//!
//!     server.listen("rpc:echo", 1337).await?;
//!     // ...
//!     server.close().await;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::announce::AnnounceTask;
use crate::directory::DirectoryClient;
use crate::dispatch::Dispatcher;
use crate::error::{PeerRpcError, Result};
use crate::handler::{
    FnHandler, HandlerId, HandlerRegistry, HandlerResult, RequestHandler, Responder,
};
use crate::model::RpcServerRequest;
use crate::transport::Transport;

/// Default interval between announcements.
pub const DEFAULT_ANNOUNCE_PERIOD: Duration = Duration::from_secs(120);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interval between announcements. Must be non-zero.
    pub announce_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            announce_period: DEFAULT_ANNOUNCE_PERIOD,
        }
    }
}

/// Name and port the server announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    service: String,
    port: u16,
}

impl ServiceIdentity {
    /// Validate and build an identity. The name must be non-empty and the
    /// port non-zero.
    pub fn new(service: &str, port: u16) -> Result<Self> {
        if service.trim().is_empty() {
            return Err(PeerRpcError::InvalidIdentity(
                "service name is empty".into(),
            ));
        }
        if port == 0 {
            return Err(PeerRpcError::InvalidIdentity("port must be > 0".into()));
        }
        Ok(Self {
            service: service.to_string(),
            port,
        })
    }

    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Builder for configuring and creating a [`PeerRpcServer`].
pub struct ServerBuilder {
    config: ServerConfig,
    handlers: Vec<Arc<dyn RequestHandler>>,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the announce period.
    ///
    /// Default: 120 seconds
    pub fn announce_period(mut self, period: Duration) -> Self {
        self.config.announce_period = period;
        self
    }

    /// Register a request handler. Handlers run in the order given.
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(RpcServerRequest, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handlers.push(Arc::new(FnHandler::new(handler)));
        self
    }

    /// Register an already shared handler.
    pub fn shared_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Build the server. Nothing is started until [`PeerRpcServer::listen`].
    pub fn build(
        self,
        directory: Arc<dyn DirectoryClient>,
        transport: Arc<dyn Transport>,
    ) -> Result<PeerRpcServer> {
        if self.config.announce_period.is_zero() {
            return Err(PeerRpcError::InvalidConfig(
                "announce period must be non-zero".into(),
            ));
        }

        let registry = Arc::new(HandlerRegistry::new());
        for handler in self.handlers {
            registry.add(handler);
        }

        Ok(PeerRpcServer {
            config: self.config,
            directory,
            dispatcher: Dispatcher::new(registry.clone(), transport.clone()),
            registry,
            transport,
            identity: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle::Idle),
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

enum Lifecycle {
    /// Never started, or the last `listen` failed.
    Idle,
    Listening(AnnounceTask),
    Closed,
}

/// A peer RPC server.
///
/// All methods take `&self`; wrap the server in an `Arc` to share it.
pub struct PeerRpcServer {
    config: ServerConfig,
    directory: Arc<dyn DirectoryClient>,
    dispatcher: Dispatcher,
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn Transport>,
    identity: RwLock<Option<ServiceIdentity>>,
    lifecycle: Mutex<Lifecycle>,
    /// Mirrors `Lifecycle::Closed` for the synchronous registry API.
    closed: AtomicBool,
}

impl PeerRpcServer {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Start serving `service` on `port` and begin announcing it.
    ///
    /// If the transport fails to start nothing is announced and the call can
    /// be retried.
    pub async fn listen(&self, service: &str, port: u16) -> Result<()> {
        let identity = ServiceIdentity::new(service, port)?;

        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Listening(_) => return Err(PeerRpcError::AlreadyListening),
            Lifecycle::Closed => return Err(PeerRpcError::Closed),
        }

        *self.identity.write() = Some(identity.clone());

        // The transport may deliver requests before start_server returns
        self.dispatcher.set_accepting(true);
        if let Err(e) = self.transport.start_server(self.dispatcher.clone()).await {
            self.dispatcher.set_accepting(false);
            tracing::warn!(service, port, "Transport failed to start: {}", e);
            return Err(match e {
                PeerRpcError::StartFailed(_) => e,
                other => PeerRpcError::StartFailed(other.to_string()),
            });
        }

        let announcer = AnnounceTask::spawn(
            self.directory.clone(),
            identity,
            self.config.announce_period,
        );
        *lifecycle = Lifecycle::Listening(announcer);

        tracing::info!(
            service,
            port,
            announce_period_ms = self.config.announce_period.as_millis() as u64,
            "Listening"
        );
        Ok(())
    }

    /// Shut the server down.
    ///
    /// Stops announcing (waiting for the announce loop to be gone), stops the
    /// transport, then drops every handler. Dispatches already running are
    /// left to finish. Calling it again, or before `listen`, is harmless.
    pub async fn close(&self) {
        let mut lifecycle = self.lifecycle.lock().await;

        let announcer = match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Closed => return,
            Lifecycle::Idle => None,
            Lifecycle::Listening(announcer) => Some(announcer),
        };

        self.closed.store(true, Ordering::Release);

        if let Some(announcer) = announcer {
            announcer.shutdown().await;
        }

        // Refuse new dispatches before the binding is torn down
        self.dispatcher.set_accepting(false);
        self.transport.stop_server().await;

        self.registry.clear();

        tracing::info!(service = ?self.service(), port = ?self.port(), "Closed");
    }

    /// Append a handler; it sees every request dispatched after this returns.
    ///
    /// A closed server still records the handler, but it never runs because
    /// a closed server never dispatches again.
    pub fn add_request_handler<F, Fut>(&self, handler: F) -> HandlerId
    where
        F: Fn(RpcServerRequest, Responder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.add_shared_handler(Arc::new(FnHandler::new(handler)))
    }

    /// Append a shared handler. The same instance may be added more than once.
    pub fn add_shared_handler(&self, handler: Arc<dyn RequestHandler>) -> HandlerId {
        let id = self.registry.add(handler);
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(
                handler = id.get(),
                "Handler added to a closed server, it will never run"
            );
        }
        id
    }

    /// Remove a registration. Running dispatches are not affected.
    pub fn remove_request_handler(&self, id: HandlerId) -> bool {
        self.registry.remove(id)
    }

    /// Remove the earliest registration of `handler`.
    pub fn remove_shared_handler(&self, handler: &Arc<dyn RequestHandler>) -> bool {
        self.registry.remove_handler(handler)
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Service name passed to the last `listen`.
    pub fn service(&self) -> Option<String> {
        self.identity.read().as_ref().map(|i| i.service.clone())
    }

    /// Port passed to the last `listen`.
    pub fn port(&self) -> Option<u16> {
        self.identity.read().as_ref().map(|i| i.port)
    }

    pub fn identity(&self) -> Option<ServiceIdentity> {
        self.identity.read().clone()
    }

    pub async fn is_listening(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Listening(_))
    }

    /// Announce period in effect.
    pub fn announce_period(&self) -> Duration {
        self.config.announce_period
    }

    /// Dispatcher shared with the transport.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::transport::mock::RecordingTransport;
    use serde_json::json;

    const PERIOD: Duration = Duration::from_millis(500);

    fn server_with(
        transport: Arc<RecordingTransport>,
    ) -> (PeerRpcServer, Arc<MemoryDirectory>) {
        let directory = Arc::new(MemoryDirectory::new());
        let server = PeerRpcServer::builder()
            .announce_period(PERIOD)
            .build(directory.clone(), transport)
            .unwrap();
        (server, directory)
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ServerBuilder::default();
        assert_eq!(builder.config.announce_period, DEFAULT_ANNOUNCE_PERIOD);
        assert!(builder.handlers.is_empty());
    }

    #[test]
    fn test_builder_rejects_zero_period() {
        let result = PeerRpcServer::builder()
            .announce_period(Duration::ZERO)
            .build(
                Arc::new(MemoryDirectory::new()),
                Arc::new(RecordingTransport::new()),
            );
        assert!(matches!(result, Err(PeerRpcError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_registers_handlers_in_order() {
        let (transport, directory) = (
            Arc::new(RecordingTransport::new()),
            Arc::new(MemoryDirectory::new()),
        );
        let server = PeerRpcServer::builder()
            .handler(|_req, _res| async { Ok(()) })
            .handler(|_req, _res| async { Ok(()) })
            .build(directory, transport)
            .unwrap();

        assert_eq!(server.handler_count(), 2);
        assert_eq!(server.announce_period(), DEFAULT_ANNOUNCE_PERIOD);
    }

    #[test]
    fn test_identity_validation() {
        assert!(ServiceIdentity::new("rpc:calc", 1337).is_ok());
        assert!(matches!(
            ServiceIdentity::new("", 1337),
            Err(PeerRpcError::InvalidIdentity(_))
        ));
        assert!(matches!(
            ServiceIdentity::new("  ", 1337),
            Err(PeerRpcError::InvalidIdentity(_))
        ));
        assert!(matches!(
            ServiceIdentity::new("rpc:calc", 0),
            Err(PeerRpcError::InvalidIdentity(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_announces_and_exposes_identity() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, directory) = server_with(transport.clone());

        assert_eq!(server.service(), None);
        server.listen("rpc:calc", 1337).await.unwrap();

        assert!(server.is_listening().await);
        assert_eq!(server.service().as_deref(), Some("rpc:calc"));
        assert_eq!(server.port(), Some(1337));
        assert_eq!(transport.starts(), 1);

        tokio::time::sleep(PERIOD * 2 + Duration::from_millis(1)).await;
        assert_eq!(directory.announce_count(), 3);
        assert_eq!(directory.lookup("rpc:calc"), vec![1337]);

        server.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_short_circuits() {
        let transport = Arc::new(RecordingTransport::failing_start());
        let (server, directory) = server_with(transport.clone());

        let result = server.listen("rpc:calc", 1337).await;
        assert!(matches!(result, Err(PeerRpcError::StartFailed(_))));
        assert!(!server.is_listening().await);
        assert!(!server.dispatcher().is_accepting());

        tokio::time::sleep(PERIOD * 5).await;
        assert_eq!(directory.announce_count(), 0);

        // Still closable
        server.close().await;
        assert_eq!(transport.stops(), 1);
    }

    #[tokio::test]
    async fn test_invalid_identity_does_not_touch_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport.clone());

        let result = server.listen("", 1337).await;
        assert!(matches!(result, Err(PeerRpcError::InvalidIdentity(_))));
        assert_eq!(transport.starts(), 0);
        assert_eq!(server.service(), None);
    }

    #[tokio::test]
    async fn test_listen_twice_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport.clone());

        server.listen("rpc:calc", 1337).await.unwrap();
        let again = server.listen("rpc:other", 1338).await;

        assert!(matches!(again, Err(PeerRpcError::AlreadyListening)));
        assert_eq!(transport.starts(), 1);
        assert_eq!(server.service().as_deref(), Some("rpc:calc"));

        server.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport.clone());
        server.add_request_handler(|_req, _res| async { Ok(()) });

        server.listen("rpc:calc", 1337).await.unwrap();
        server.close().await;
        server.close().await;

        assert_eq!(transport.stops(), 1);
        assert_eq!(server.handler_count(), 0);
        assert!(!server.is_listening().await);
        assert!(!server.dispatcher().is_accepting());
    }

    #[tokio::test]
    async fn test_close_before_listen() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport.clone());

        server.close().await;
        assert_eq!(transport.stops(), 1);

        let result = server.listen("rpc:calc", 1337).await;
        assert!(matches!(result, Err(PeerRpcError::Closed)));
        assert_eq!(transport.starts(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_through_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport.clone());

        server.add_request_handler(|req, res| async move {
            let n: i64 = req.payload_as()?;
            res.reply(&(n * 2)).await
        });
        server.listen("rpc:double", 1337).await.unwrap();

        let dispatcher = transport.dispatcher().unwrap();
        let summary = dispatcher
            .dispatch(RpcServerRequest::new("r1", "rpc:double", json!(21)))
            .await;

        assert_eq!(summary.invoked, 1);
        assert_eq!(transport.responses()[0].data, json!(42));

        server.close().await;

        // Transport kept a stale dispatcher: nothing runs after close
        let summary = dispatcher
            .dispatch(RpcServerRequest::new("r2", "rpc:double", json!(1)))
            .await;
        assert_eq!(summary.invoked, 0);
    }

    #[tokio::test]
    async fn test_close_refuses_dispatch_before_stopping_transport() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport.clone());

        server.listen("rpc:calc", 1337).await.unwrap();
        assert_eq!(transport.accepting_at_stop(), None);

        server.close().await;
        assert_eq!(transport.accepting_at_stop(), Some(false));
    }

    #[tokio::test]
    async fn test_handler_added_after_close_never_runs() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport.clone());

        server.listen("rpc:calc", 1337).await.unwrap();
        let dispatcher = transport.dispatcher().unwrap();
        server.close().await;

        server.add_request_handler(|_req, res| async move { res.reply(&"late").await });
        assert_eq!(server.handler_count(), 1);

        let summary = dispatcher
            .dispatch(RpcServerRequest::new("r1", "rpc:calc", json!(null)))
            .await;
        assert_eq!(summary.invoked, 0);
        assert!(transport.responses().is_empty());
    }

    #[tokio::test]
    async fn test_builder_shared_handler_keeps_identity() {
        let transport = Arc::new(RecordingTransport::new());
        let shared: Arc<dyn RequestHandler> = Arc::new(FnHandler::new(
            |_req: RpcServerRequest, res: Responder| async move { res.reply(&"shared").await },
        ));

        let server = PeerRpcServer::builder()
            .shared_handler(shared.clone())
            .handler(|_req, res| async move { res.reply(&"closure").await })
            .shared_handler(shared.clone())
            .build(Arc::new(MemoryDirectory::new()), transport.clone())
            .unwrap();
        assert_eq!(server.handler_count(), 3);

        server.listen("rpc:calc", 1337).await.unwrap();
        let dispatcher = transport.dispatcher().unwrap();
        dispatcher
            .dispatch(RpcServerRequest::new("r1", "rpc:calc", json!(null)))
            .await;
        let data: Vec<_> = transport.responses().into_iter().map(|r| r.data).collect();
        assert_eq!(data, vec![json!("shared"), json!("closure"), json!("shared")]);

        // Removal by identity drops the earliest registration only
        assert!(server.remove_shared_handler(&shared));
        dispatcher
            .dispatch(RpcServerRequest::new("r2", "rpc:calc", json!(null)))
            .await;
        let data: Vec<_> = transport.responses()[3..]
            .iter()
            .map(|r| r.data.clone())
            .collect();
        assert_eq!(data, vec![json!("closure"), json!("shared")]);

        server.close().await;
    }

    #[tokio::test]
    async fn test_remove_request_handler() {
        let transport = Arc::new(RecordingTransport::new());
        let (server, _directory) = server_with(transport);

        let a = server.add_request_handler(|_req, _res| async { Ok(()) });
        let b = server.add_request_handler(|_req, _res| async { Ok(()) });

        assert!(server.remove_request_handler(a));
        assert!(!server.remove_request_handler(a));
        assert_eq!(server.handler_count(), 1);
        assert!(server.remove_request_handler(b));
        assert_eq!(server.handler_count(), 0);
    }
}
