//! Request and response values exchanged between a transport and handlers.
//!
//! Both types derive `serde` traits so a transport binding can put them on
//! the wire in whatever shape it needs. The core itself never encodes them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One inbound RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcServerRequest {
    /// Correlation id chosen by the caller.
    pub rid: String,
    /// Service key the caller addressed.
    pub key: String,
    /// Call arguments.
    pub payload: Value,
}

impl RpcServerRequest {
    /// Create a new request.
    pub fn new(rid: impl Into<String>, key: impl Into<String>, payload: Value) -> Self {
        Self {
            rid: rid.into(),
            key: key.into(),
            payload,
        }
    }

    /// Decode the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// One outbound reply to a previously received request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcServerResponse {
    /// Correlation id copied from the request.
    pub rid: String,
    /// Error message, `None` on success.
    pub error: Option<String>,
    /// Result data (`null` for errors).
    pub data: Value,
}

impl RpcServerResponse {
    /// Successful response carrying `data`.
    pub fn ok(rid: impl Into<String>, data: Value) -> Self {
        Self {
            rid: rid.into(),
            error: None,
            data,
        }
    }

    /// Error response carrying `message`.
    pub fn err(rid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rid: rid.into(),
            error: Some(message.into()),
            data: Value::Null,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
