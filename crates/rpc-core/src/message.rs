//! The message codec contract.
//!
//! The framework treats request/response payloads opaquely: it only needs
//! `encode -> bytes` and `decode(bytes) -> Self`. Concrete services supply
//! their own message types and get this contract for free via the blanket
//! impl below, backed by `serde_json` — swapping the wire codec later only
//! means implementing `Message` directly, the dispatch and framing layers
//! never need to change.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Result, RpcError};

/// A value that can cross the wire as an RPC request or response.
///
/// - Why: dispatch and framing only need `encode`/`decode`; they should
///   never need to know which concrete codec backs a given message type.
/// - What: any `Serialize + DeserializeOwned` type gets this for free via
///   the blanket impl below. A type that needs a different wire format
///   (binary, a schema-checked format) implements `Message` directly and
///   nothing upstream has to change.
pub trait Message: Sized + Send + Sync + 'static {
    fn encode(&self) -> Result<Bytes>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl<T> Message for T
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|_| RpcError::Serialize)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|_| RpcError::Deserialize)
    }
}
