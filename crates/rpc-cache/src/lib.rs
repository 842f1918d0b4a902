//! TTL key-value cache service: an in-memory store with expiring
//! entries, exposed as RPC methods via `rpc-core`'s descriptor dispatch.

pub mod engine;
pub mod messages;
pub mod service;

pub use engine::{spawn_sweeper, CacheEngine};
pub use service::{register, SERVICE_NAME};
