//! Handler module - request handlers and their response capability.
//!
//! Provides:
//! - [`HandlerRegistry`] - ordered list of handlers every request is fanned out to
//! - [`Responder`] - lets a handler send responses for its request
//!
//! # Example
//!
//! ```ignore
//! use peer_rpc::handler::{FnHandler, HandlerRegistry, Responder};
//!
//! let registry = HandlerRegistry::new();
//! registry.add(Arc::new(FnHandler::new(|req, res: Responder| async move {
//!     res.reply(&req.payload).await
//! })));
//! ```

mod registry;
mod responder;

pub use registry::{
    BoxFuture, FnHandler, HandlerId, HandlerRegistry, HandlerResult, RequestHandler,
};
pub use responder::Responder;
