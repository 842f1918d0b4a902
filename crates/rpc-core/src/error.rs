//! Error taxonomy shared by every crate in the workspace.
//!
//! Mirrors the failure kinds enumerated in the framework's wire contract:
//! resolve, connect, serialize/deserialize, transport, service-unavailable,
//! canceled and timeout. Every variant carries the context it needs to
//! format a human-readable message and nothing else — callers that need
//! to branch on kind should match on the variant, not parse the message.

use thiserror::Error;

/// Top-level error for the RPC core contracts (framing, controller,
/// resolver, descriptors).
///
/// - Why: one flat enum instead of per-crate error types, since every
///   layer a call passes through (resolve, connect, send, dispatch,
///   decode) needs to land on the same `Controller::set_failed` text and
///   the same `Result<T, RpcError>` alias — a `Box<dyn Error>` would lose
///   the ability to match on kind.
/// - What: callers that need to distinguish failure categories (retry on
///   `Connect`, give up on `MethodNotFound`) match on the variant; callers
///   that just need a message call `as_failure_text`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    /// The resolver returned nothing, or a value that could not be split
    /// into `ip:port`.
    #[error("{path} is not exist!")]
    ResolveMissing { path: String },

    /// The resolver returned a value without a `:` separator.
    #[error("{path} address is invalid!")]
    ResolveInvalid { path: String },

    /// Connection establishment failed or exceeded its deadline.
    #[error("connect failed: {reason}")]
    Connect { reason: String },

    /// `Message::encode` failed for the request.
    #[error("serialize request fail")]
    Serialize,

    /// `Message::decode` failed for the reply.
    #[error("parse error")]
    Deserialize,

    /// A send or recv syscall failed mid-call.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The heartbeat supervisor reports the target endpoint as down.
    #[error("service not available: {service_key}")]
    ServiceUnavailable { service_key: String },

    /// The call's controller was canceled.
    #[error("canceled")]
    Canceled,

    /// The call's controller timeout elapsed.
    #[error("timeout")]
    Timeout,

    /// A frame was structurally invalid (bad varint, header didn't parse).
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// The server has no registered service or method matching the
    /// frame header.
    #[error("no such method: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    /// A method handler panicked while executing.
    #[error("handler panicked: {service}.{method}")]
    HandlerPanicked { service: String, method: String },
}

impl RpcError {
    /// Short text suitable for `Controller::set_failed`, matching the
    /// fixed-text conventions called out in the wire contract.
    pub fn as_failure_text(&self) -> String {
        self.to_string()
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
