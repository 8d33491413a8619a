//! Response capability handed to request handlers.
//!
//! A [`Responder`] is bound to one inbound request. Every call forwards a
//! response to the transport and reports the transport's outcome. It can be
//! called any number of times; nothing is deduplicated.
//!
//! # Example
//!
//! ```ignore
//! async fn add(req: RpcServerRequest, res: Responder) -> Result<()> {
//!     let (a, b): (i64, i64) = req.payload_as()?;
//!     res.reply(&(a + b)).await
//! }
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::model::{RpcServerRequest, RpcServerResponse};
use crate::transport::Transport;

/// Sends responses for a single request.
///
/// `Responder` is `Clone` and can be moved into spawned tasks.
#[derive(Clone)]
pub struct Responder {
    rid: String,
    key: String,
    transport: Arc<dyn Transport>,
}

impl Responder {
    pub(crate) fn new(request: &RpcServerRequest, transport: Arc<dyn Transport>) -> Self {
        Self {
            rid: request.rid.clone(),
            key: request.key.clone(),
            transport,
        }
    }

    /// Correlation id of the request.
    #[inline]
    pub fn rid(&self) -> &str {
        &self.rid
    }

    /// Service key of the request.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Forward a prepared response to the transport as is.
    pub async fn send(&self, response: RpcServerResponse) -> Result<()> {
        self.transport.send_response(response).await
    }

    /// Send a success response with `data` serialized to JSON.
    pub async fn reply<T: Serialize>(&self, data: &T) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.send(RpcServerResponse::ok(self.rid.clone(), data)).await
    }

    /// Send an error response.
    pub async fn reply_error(&self, message: &str) -> Result<()> {
        self.send(RpcServerResponse::err(self.rid.clone(), message))
            .await
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("rid", &self.rid)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
