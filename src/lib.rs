//! # peer-rpc
//!
//! Lifecycle and request-dispatch core for RPC servers that take part in a
//! peer overlay.
//!
//! A [`PeerRpcServer`] does two things once it is listening:
//!
//! - **Announce**: tells the overlay directory "service S is on port P"
//!   immediately and then once per announce period, through a
//!   [`DirectoryClient`].
//! - **Dispatch**: every request the [`Transport`] receives is handed to
//!   each registered handler in registration order. Handlers reply through
//!   the [`Responder`] they are given.
//!
//! The wire binding and the directory protocol live behind the
//! [`Transport`] and [`DirectoryClient`] traits.
//!
//! ## Example
//!
//! ```ignore
//! use peer_rpc::directory::MemoryDirectory;
//! use peer_rpc::transport::ChannelTransport;
//! use peer_rpc::PeerRpcServer;
//!
//! #[tokio::main]
//! async fn main() -> peer_rpc::Result<()> {
//!     let (transport, mut peer) = ChannelTransport::new(64);
//!
//!     let server = PeerRpcServer::builder()
//!         .handler(|req, res| async move { res.reply(&req.payload).await })
//!         .build(Arc::new(MemoryDirectory::new()), Arc::new(transport))?;
//!
//!     server.listen("rpc:echo", 1337).await?;
//!     // ...
//!     server.close().await;
//!     Ok(())
//! }
//! ```

pub mod directory;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod model;
pub mod transport;

mod announce;
mod server;

pub use directory::DirectoryClient;
pub use dispatch::{DispatchSummary, Dispatcher};
pub use error::{PeerRpcError, Result};
pub use handler::{HandlerId, RequestHandler, Responder};
pub use model::{RpcServerRequest, RpcServerResponse};
pub use server::{
    PeerRpcServer, ServerBuilder, ServerConfig, ServiceIdentity, DEFAULT_ANNOUNCE_PERIOD,
};
pub use transport::Transport;
