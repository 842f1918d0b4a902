//! Client-side channel: one route to one `(service, method)` endpoint.
//!
//! A channel resolves its endpoint on the first call and caches the
//! resolution; every call after that reconnects a fresh socket to the
//! same resolved address (per the wire contract, calls never multiplex
//! over one connection). Replies are read to EOF rather than capped at a
//! single fixed-size `recv`, fixing the truncation bug flagged for the
//! original implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rpc_core::error::{Result, RpcError};
use rpc_core::frame::{encode_request, FrameHeader};
use rpc_core::message::Message;
use rpc_core::resolver::{Resolver, ResolverAdapter};
use rpc_core::Controller;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::supervisor::{Supervisor, DEFAULT_ENDPOINT_TIMEOUT_MS};

#[derive(Clone)]
struct ResolvedEndpoint {
    ip: String,
    port: u16,
    service_key: String,
}

/// Client-side route to one `(service, method)` endpoint.
///
/// - Why: the wire contract has no multiplexing — every call opens its
///   own socket — so a channel's only standing state is which endpoint
///   it talks to, resolved once and cached, not a live connection.
/// - What: `call_method` is the only operation that matters; `new` is
///   cheap (no I/O), `connect_eager` exists for callers that want to fail
///   fast at construction instead of on the first call.
/// - Trade-offs: the resolved endpoint is cached forever once set — a
///   channel does not re-resolve if the backing service moves. Callers
///   that expect endpoint churn should build a fresh channel per call
///   instead of reusing one long-lived instance.
pub struct ClientChannel<R> {
    resolver: Arc<ResolverAdapter<R>>,
    supervisor: Arc<Supervisor>,
    service_name: String,
    method_name: String,
    heartbeat_enabled: AtomicBool,
    endpoint: AsyncMutex<Option<ResolvedEndpoint>>,
}

impl<R: Resolver> ClientChannel<R> {
    pub fn new(
        resolver: Arc<ResolverAdapter<R>>,
        supervisor: Arc<Supervisor>,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            supervisor,
            service_name: service_name.into(),
            method_name: method_name.into(),
            heartbeat_enabled: AtomicBool::new(false),
            endpoint: AsyncMutex::new(None),
        }
    }

    /// Builds a channel and eagerly resolves and connects (best effort,
    /// up to three retries), matching the constructor contract of
    /// `connect_now=true`.
    pub async fn connect_eager(
        resolver: Arc<ResolverAdapter<R>>,
        supervisor: Arc<Supervisor>,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        let channel = Self::new(resolver, supervisor, service_name, method_name);
        let warmup = Controller::new();
        for attempt in 0..3 {
            if let Ok(endpoint) = channel.ensure_resolved(&warmup).await {
                if TcpStream::connect((endpoint.ip.as_str(), endpoint.port)).await.is_ok() {
                    break;
                }
            }
            if attempt < 2 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        channel
    }

    /// Toggles supervisor integration; enabling starts the supervisor's
    /// sweeper if it isn't already running.
    pub fn enable_heartbeat(&self, enabled: bool) {
        self.heartbeat_enabled.store(enabled, Ordering::Release);
        if enabled {
            Arc::clone(&self.supervisor).start();
        }
    }

    async fn ensure_resolved(&self, controller: &Controller) -> Result<ResolvedEndpoint> {
        let mut guard = self.endpoint.lock().await;
        if let Some(endpoint) = guard.as_ref() {
            return Ok(endpoint.clone());
        }

        let (ip, port) = self.resolver.resolve(&self.service_name, &self.method_name).await?;
        let service_key = format!("{}.{}@{}:{}", self.service_name, self.method_name, ip, port);

        if self.heartbeat_enabled.load(Ordering::Acquire) {
            self.supervisor.register(service_key.clone(), ip.clone(), port, DEFAULT_ENDPOINT_TIMEOUT_MS);
            if !self.supervisor.is_available(&service_key) {
                warn!(target: "rpc_transport_tcp::channel", %service_key, "endpoint not available per supervisor");
                return Err(RpcError::ServiceUnavailable { service_key });
            }
        }

        let endpoint = ResolvedEndpoint { ip, port, service_key };
        *guard = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// Resolves (once), connects a fresh socket, sends one framed
    /// request and returns the decoded reply. Any failure is recorded on
    /// `controller` via `set_failed` and returned as an error.
    ///
    /// - Contract: the entire body — resolve, connect, send, receive,
    ///   decode — runs under `controller.timeout()`, not just the
    ///   connect step, so a slow server that accepts the connection but
    ///   never replies still times out.
    /// - Post-condition: on any `Err`, `controller.failed()` is true and
    ///   `controller.error_text()` describes why; on `Ok`, the controller
    ///   is left untouched.
    pub async fn call_method<Req, Resp>(&self, controller: &Controller, request: &Req) -> Result<Resp>
    where
        Req: Message,
        Resp: Message,
    {
        controller.set_start_time();

        let endpoint = match self.ensure_resolved(controller).await {
            Ok(endpoint) => endpoint,
            Err(err) => {
                controller.set_failed(err.as_failure_text());
                return Err(err);
            }
        };

        let budget = controller.timeout();
        match tokio::time::timeout(budget, self.call_body(&endpoint, request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => {
                controller.set_failed(err.as_failure_text());
                Err(err)
            }
            Err(_elapsed) => {
                controller.set_failed(RpcError::Timeout.as_failure_text());
                Err(RpcError::Timeout)
            }
        }
    }

    async fn call_body<Req, Resp>(&self, endpoint: &ResolvedEndpoint, request: &Req) -> Result<Resp>
    where
        Req: Message,
        Resp: Message,
    {
        let mut stream = TcpStream::connect((endpoint.ip.as_str(), endpoint.port))
            .await
            .map_err(|err| RpcError::Connect { reason: err.to_string() })?;

        let payload = request.encode()?;
        let header = FrameHeader::new(self.service_name.clone(), self.method_name.clone(), payload.len() as u32);
        let frame = encode_request(&header, &payload)?;

        stream.write_all(&frame).await.map_err(|err| RpcError::Transport { reason: err.to_string() })?;

        let mut reply = Vec::new();
        stream
            .read_to_end(&mut reply)
            .await
            .map_err(|err| RpcError::Transport { reason: err.to_string() })?;

        Resp::decode(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_core::InMemoryResolver;
    use serde::{Deserialize, Serialize};
    use tokio::io::AsyncReadExt as _;
    use tokio::net::TcpListener;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Pong {
        n: u32,
    }

    #[tokio::test]
    async fn resolve_failure_fails_call_with_resolve_missing() {
        let resolver = Arc::new(ResolverAdapter::new(InMemoryResolver::new()));
        let supervisor = Supervisor::new(Duration::from_secs(5));
        let channel = ClientChannel::new(resolver, supervisor, "Svc", "M");
        let controller = Controller::new();
        let err = channel
            .call_method::<Ping, Pong>(&controller, &Ping { n: 1 })
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::ResolveMissing { path: "/Svc/M".into() });
        assert!(controller.failed());
    }

    #[tokio::test]
    async fn round_trips_a_call_against_a_raw_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut decoder = rpc_core::frame::FrameDecoder::new();
            let mut buf = [0u8; 256];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                decoder.push(&buf[..n]);
                if let Some((_header, payload)) = decoder.try_parse().unwrap() {
                    let request: Ping = Message::decode(&payload).unwrap();
                    let reply = Pong { n: request.n + 1 };
                    let bytes = reply.encode().unwrap();
                    socket.write_all(&bytes).await.unwrap();
                    socket.shutdown().await.unwrap();
                    break;
                }
            }
        });

        let store = InMemoryResolver::new();
        store.publish("/Svc/M", format!("127.0.0.1:{}", addr.port()));
        let resolver = Arc::new(ResolverAdapter::new(store));
        let supervisor = Supervisor::new(Duration::from_secs(5));
        let channel = ClientChannel::new(resolver, supervisor, "Svc", "M");
        let controller = Controller::new();

        let reply: Pong = channel.call_method(&controller, &Ping { n: 41 }).await.unwrap();
        assert_eq!(reply, Pong { n: 42 });
        assert!(!controller.failed());
    }
}
