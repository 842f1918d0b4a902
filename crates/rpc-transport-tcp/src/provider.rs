//! Server-side accept loop and dispatcher.
//!
//! Accepts connections on a single Tokio listener, buffers partial frames
//! per connection (fixing the "one read = one frame" assumption flagged
//! for the original), looks the method up in the registry, and replies
//! with the serialized response before half-closing for write so the
//! client's read observes EOF.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use rpc_core::descriptor::{MethodHandler, ServiceRegistry};
use rpc_core::error::{Result, RpcError};
use rpc_core::frame::{FrameDecoder, FrameHeader};
use rpc_core::resolver::Registrar;
use rpc_core::Controller;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// A probe connection that connects and closes without sending any bytes
/// is the default shape of a heartbeat check.
pub fn is_heartbeat_request(bytes: &[u8]) -> bool {
    bytes.is_empty()
}

/// Minimal error envelope used when dispatch itself fails (unknown
/// method, malformed payload, panicking handler) — distinct from an
/// application-level `ResultCode`, which is the service's own business.
#[derive(Serialize)]
struct DispatchErrorReply {
    errcode: i32,
    errmsg: String,
}

/// Registers services, accepts connections, and dispatches framed
/// requests to the matching method.
///
/// - Why: the registrar (coordination-store publish) and the dispatch
///   table (which methods exist) are two independent concerns that only
///   meet at `run` — keeping them as separate fields rather than folding
///   registration into the registrar lets either be swapped without
///   touching the other.
/// - What: `register`/`registry_mut` build the dispatch table before
///   `run` is ever called; `run` binds, publishes every registered
///   `(service, method)` once, then loops accepting connections forever.
///   Each connection is handled on its own spawned task so one slow or
///   stuck peer never blocks the accept loop.
pub struct ServerProvider<Reg> {
    registry: ServiceRegistry,
    registrar: Arc<Reg>,
    heartbeat_response_enabled: AtomicBool,
}

impl<Reg: Registrar + 'static> ServerProvider<Reg> {
    pub fn new(registrar: Arc<Reg>) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            registrar,
            heartbeat_response_enabled: AtomicBool::new(true),
        }
    }

    /// Collects one method under `service_name`/`method_name` into the
    /// internal dispatch table. Call before `run`.
    pub fn register(
        &mut self,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        handler: impl MethodHandler + 'static,
    ) {
        self.registry.register(service_name, method_name, handler);
    }

    /// Toggles the pure-connect heartbeat handling described in the
    /// wire contract.
    pub fn enable_heartbeat_response(&self, enabled: bool) {
        self.heartbeat_response_enabled.store(enabled, Ordering::Release);
    }

    /// Direct access to the dispatch table, for service registration
    /// helpers (e.g. `rpc_cache::service::register`) that take a
    /// `&mut ServiceRegistry` rather than going through `register` one
    /// method at a time.
    pub fn registry_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.registry
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Binds `bind_addr`, publishes every registered `(service, method)`
    /// to the coordination store as `advertise_ip:advertise_port`
    /// ephemeral nodes, then runs the accept loop until the listener
    /// itself errors out.
    pub async fn run(self: Arc<Self>, bind_addr: SocketAddr, advertise_ip: &str, advertise_port: u16) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|err| RpcError::Transport { reason: err.to_string() })?;

        for (service, method) in self.registry.method_paths() {
            let path = format!("/{service}/{method}");
            let value = format!("{advertise_ip}:{advertise_port}");
            self.registrar.publish_ephemeral(&path, &value).await?;
            info!(target: "rpc_transport_tcp::provider", %path, %value, "published service endpoint");
        }

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(target: "rpc_transport_tcp::provider", error = %err, "accept failed");
                    continue;
                }
            };
            let provider = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = provider.handle_connection(socket).await {
                    warn!(target: "rpc_transport_tcp::provider", %peer, error = %err, "connection ended with error");
                }
            });
        }
    }

    async fn handle_connection(&self, mut socket: TcpStream) -> Result<()> {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 4096];
        let mut first_read = true;

        loop {
            let n = socket
                .read(&mut buf)
                .await
                .map_err(|err| RpcError::Transport { reason: err.to_string() })?;

            if n == 0 {
                if first_read && self.heartbeat_response_enabled.load(Ordering::Acquire) {
                    return Ok(()); // bare connect+close heartbeat probe
                }
                return Ok(()); // peer hung up before a full frame arrived
            }
            first_read = false;
            decoder.push(&buf[..n]);

            if let Some((header, payload)) = decoder.try_parse()? {
                return self.dispatch_and_reply(&mut socket, header, payload).await;
            }
        }
    }

    /// Contract: a dispatch failure (unknown method, bad payload, a
    /// panicking handler) still gets a reply — a generic JSON error
    /// envelope rather than the typed response — and the socket still
    /// shuts down cleanly afterward. A malformed request never just
    /// closes the connection in silence.
    async fn dispatch_and_reply(&self, socket: &mut TcpStream, header: FrameHeader, payload: Bytes) -> Result<()> {
        let controller = Controller::new();
        let reply_bytes = match self
            .registry
            .dispatch(&header.service_name, &header.method_name, controller, payload)
            .await
        {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(
                    target: "rpc_transport_tcp::provider",
                    service = %header.service_name,
                    method = %header.method_name,
                    %err,
                    "dispatch failed"
                );
                let envelope = DispatchErrorReply { errcode: -1, errmsg: err.to_string() };
                Bytes::from(serde_json::to_vec(&envelope).unwrap_or_default())
            }
        };

        socket
            .write_all(&reply_bytes)
            .await
            .map_err(|err| RpcError::Transport { reason: err.to_string() })?;
        socket
            .shutdown()
            .await
            .map_err(|err| RpcError::Transport { reason: err.to_string() })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_core::message::Message;
    use rpc_core::resolver::ResolverAdapter;
    use rpc_core::{FnMethodHandler, InMemoryResolver};
    use serde::Deserialize;
    use std::net::SocketAddr;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Pong {
        n: u32,
    }

    #[tokio::test]
    async fn heartbeat_probe_is_dropped_silently() {
        let store = Arc::new(InMemoryResolver::new());
        let provider: Arc<ServerProvider<InMemoryResolver>> = Arc::new(ServerProvider::new(store));
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let bound = listener.local_addr().unwrap();
        drop(listener);

        let provider_clone = Arc::clone(&provider);
        tokio::spawn(async move {
            let _ = provider_clone.run(bound, "127.0.0.1", bound.port()).await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let stream = TcpStream::connect(bound).await.unwrap();
        drop(stream); // bare connect+close

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn serves_a_registered_method_end_to_end() {
        let store = Arc::new(InMemoryResolver::new());
        let mut provider = ServerProvider::new(Arc::clone(&store));
        provider.register(
            "Echo",
            "Bump",
            FnMethodHandler::new(|_ctl: Controller, req: Ping| async move { Pong { n: req.n + 1 } }),
        );
        let provider = Arc::new(provider);

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        let bound = listener.local_addr().unwrap();
        drop(listener);

        let provider_clone = Arc::clone(&provider);
        tokio::spawn(async move {
            let _ = provider_clone.run(bound, "127.0.0.1", bound.port()).await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let resolver = Arc::new(ResolverAdapter::new(Arc::clone(&store)));
        let supervisor = crate::supervisor::Supervisor::new(std::time::Duration::from_secs(5));
        let channel = crate::channel::ClientChannel::new(resolver, supervisor, "Echo", "Bump");
        let controller = Controller::new();
        let reply: Pong = channel.call_method(&controller, &Ping { n: 9 }).await.unwrap();
        assert_eq!(reply, Pong { n: 10 });
    }
}
