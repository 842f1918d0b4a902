//! TCP transport for the RPC framework: the client channel, the server
//! provider (accept loop + dispatch), and the heartbeat supervisor that
//! backs both sides' notion of "is this endpoint still up".

pub mod channel;
pub mod provider;
pub mod supervisor;

pub use channel::ClientChannel;
pub use provider::{is_heartbeat_request, ServerProvider};
pub use supervisor::{HeartbeatProbe, Supervisor, DEFAULT_ENDPOINT_TIMEOUT_MS};
