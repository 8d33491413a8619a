//! Loopback transport over tokio channels.
//!
//! # Example
//!
//! ```ignore
//! use peer_rpc::transport::ChannelTransport;
//!
//! let (transport, mut peer) = ChannelTransport::new(64);
//! // hand `transport` to the server, then:
//! peer.request(RpcServerRequest::new("1", "echo", json!("hi"))).await?;
//! let response = peer.next_response().await;
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::Transport;
use crate::dispatch::Dispatcher;
use crate::error::{PeerRpcError, Result};
use crate::model::{RpcServerRequest, RpcServerResponse};

/// Default capacity of both request and response queues.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Running accept loop. The task hands the request receiver back on exit.
struct AcceptLoop {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<mpsc::Receiver<RpcServerRequest>>,
}

enum LoopState {
    Idle(mpsc::Receiver<RpcServerRequest>),
    Running(AcceptLoop),
    /// Accept loop panicked; the receiver is lost.
    Broken,
}

/// Server side of the loopback pair.
pub struct ChannelTransport {
    state: Mutex<LoopState>,
    responses: mpsc::Sender<RpcServerResponse>,
}

/// Client side of the loopback pair.
pub struct ChannelPeer {
    requests: mpsc::Sender<RpcServerRequest>,
    responses: mpsc::Receiver<RpcServerResponse>,
}

impl ChannelTransport {
    /// Create a connected transport/peer pair with the given queue capacity.
    pub fn new(capacity: usize) -> (Self, ChannelPeer) {
        let (req_tx, req_rx) = mpsc::channel(capacity);
        let (resp_tx, resp_rx) = mpsc::channel(capacity);

        let transport = Self {
            state: Mutex::new(LoopState::Idle(req_rx)),
            responses: resp_tx,
        };
        let peer = ChannelPeer {
            requests: req_tx,
            responses: resp_rx,
        };
        (transport, peer)
    }

    /// Whether the accept loop is currently running.
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), LoopState::Running(_))
    }

    async fn accept_loop(
        mut inbound: mpsc::Receiver<RpcServerRequest>,
        dispatcher: Dispatcher,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> mpsc::Receiver<RpcServerRequest> {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                next = inbound.recv() => match next {
                    Some(request) => {
                        // Requests are independent; each gets its own dispatch task.
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            dispatcher.dispatch(request).await;
                        });
                    }
                    None => {
                        tracing::debug!("Loopback peer dropped its request sender");
                        break;
                    }
                },
            }
        }
        inbound
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn start_server(&self, dispatcher: Dispatcher) -> Result<()> {
        let mut state = self.state.lock();

        let inbound = match std::mem::replace(&mut *state, LoopState::Broken) {
            LoopState::Idle(rx) => rx,
            LoopState::Running(running) => {
                *state = LoopState::Running(running);
                return Err(PeerRpcError::StartFailed(
                    "loopback transport already running".into(),
                ));
            }
            LoopState::Broken => {
                return Err(PeerRpcError::StartFailed(
                    "loopback request channel is gone".into(),
                ));
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(Self::accept_loop(inbound, dispatcher, shutdown_rx));
        *state = LoopState::Running(AcceptLoop { shutdown_tx, task });
        Ok(())
    }

    async fn stop_server(&self) {
        let running = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, LoopState::Broken) {
                LoopState::Running(running) => running,
                other => {
                    *state = other;
                    return;
                }
            }
        };

        // The loop may already have exited on its own
        let _ = running.shutdown_tx.send(());

        match running.task.await {
            Ok(inbound) => *self.state.lock() = LoopState::Idle(inbound),
            Err(e) => tracing::error!("Loopback accept loop failed: {}", e),
        }
    }

    async fn send_response(&self, response: RpcServerResponse) -> Result<()> {
        self.responses
            .send(response)
            .await
            .map_err(|_| PeerRpcError::ConnectionClosed)
    }
}

impl ChannelPeer {
    /// Submit a request to the server.
    ///
    /// Requests sent before the transport starts are queued.
    pub async fn request(&self, request: RpcServerRequest) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| PeerRpcError::ConnectionClosed)
    }

    /// Wait for the next response. `None` once the transport is dropped.
    pub async fn next_response(&mut self) -> Option<RpcServerResponse> {
        self.responses.recv().await
    }

    /// Take a response if one is already queued.
    pub fn try_next_response(&mut self) -> Option<RpcServerResponse> {
        self.responses.try_recv().ok()
    }
}
