//! Transport module - the boundary between the core and a wire binding.
//!
//! A binding (HTTP listener, message-queue consumer, ...) implements
//! [`Transport`]. The server starts it with a [`Dispatcher`] the binding uses
//! to hand over every inbound request, and routes handler responses back
//! through [`Transport::send_response`].
//!
//! [`ChannelTransport`] is an in-process loopback binding over tokio
//! channels, used for embedding and for tests.

mod channel;

use async_trait::async_trait;

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::model::RpcServerResponse;

pub use channel::{ChannelPeer, ChannelTransport, DEFAULT_CHANNEL_CAPACITY};

/// Lifecycle and reply hooks the server needs from a wire binding.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Begin accepting inbound calls, delivering each one to `dispatcher`.
    ///
    /// Called once per successful `listen`. An `Err` aborts the `listen`.
    async fn start_server(&self, dispatcher: Dispatcher) -> Result<()>;

    /// Stop accepting calls and release binding resources.
    ///
    /// Must tolerate being called when the binding never started.
    async fn stop_server(&self);

    /// Deliver one response for a previously received request.
    async fn send_response(&self, response: RpcServerResponse) -> Result<()>;
}
