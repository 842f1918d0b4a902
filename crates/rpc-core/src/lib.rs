//! Wire-level contracts for the RPC framework: framing, the per-call
//! controller, the resolver adapter, the message codec contract, and
//! descriptor-driven dispatch. Transport-specific code (TCP channels,
//! the heartbeat supervisor, the server accept loop) lives in
//! `rpc-transport-tcp`; concrete services such as the TTL cache live in
//! their own crates and depend on this one.

pub mod controller;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod message;
pub mod resolver;

pub use controller::Controller;
pub use descriptor::{FnMethodHandler, MethodHandler, ServiceRegistry};
pub use error::{Result, RpcError};
pub use frame::{FrameDecoder, FrameHeader};
pub use message::Message;
pub use resolver::{InMemoryResolver, Registrar, Resolver, ResolverAdapter};
