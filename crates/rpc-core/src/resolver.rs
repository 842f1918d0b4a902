//! Resolver adapter: a thin wrapper over the coordination store.
//!
//! The coordination store itself (ZooKeeper or anything else that can
//! hold `path -> value` ephemeral nodes) is an external collaborator and
//! out of scope here — it is exposed only through the [`Resolver`] trait.
//! [`ResolverAdapter`] turns `Resolver::get_data` into a parsed
//! `(host, port)` pair for a `(service, method)` pair, applying the
//! framework's resolve-failure rules.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, RpcError};

/// External coordination-store client. Implementations own their own
/// connection lifecycle; `start` is called once before first use.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn get_data(&self, path: &str) -> Result<String>;
}

/// Resolves `(service, method)` pairs to `ip:port` endpoints via a
/// [`Resolver`], applying the wire contract's path shape and failure
/// rules.
///
/// - Why: `Resolver` only promises raw `get_data`; every caller still has
///   to build the `/service/method` path and split the `ip:port` string,
///   so that logic lives once here instead of at every call site.
/// - What: `resolve` never panics on malformed input — an empty value
///   becomes `ResolveMissing`, a value with no `:` or a non-numeric port
///   becomes `ResolveInvalid`. Both are ordinary `RpcError` variants, not
///   something callers need to downcast.
pub struct ResolverAdapter<R> {
    resolver: R,
}

impl<R: Resolver> ResolverAdapter<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    pub async fn start(&self) -> Result<()> {
        self.resolver.start().await
    }

    /// Looks up `/service/method` and splits the result into host/port.
    /// Fails with `ResolveMissing` on an empty value, `ResolveInvalid` on
    /// a value with no `:` separator or a non-numeric port.
    pub async fn resolve(&self, service: &str, method: &str) -> Result<(String, u16)> {
        let path = format!("/{service}/{method}");
        let data = self.resolver.get_data(&path).await?;
        if data.is_empty() {
            return Err(RpcError::ResolveMissing { path });
        }
        let sep = data.find(':').ok_or_else(|| RpcError::ResolveInvalid { path: path.clone() })?;
        let host = data[..sep].to_string();
        let port: u16 = data[sep + 1..]
            .parse()
            .map_err(|_| RpcError::ResolveInvalid { path })?;
        Ok((host, port))
    }
}

/// Write side of the coordination store: publishing ephemeral
/// `path -> value` nodes. Kept separate from [`Resolver`] because a
/// read-only client never needs it — only the server provider, after
/// binding, publishes `/service/method -> ip:port` entries.
///
/// - Why: a server, after binding its listener, needs to tell the
///   coordination store where it lives; a client only ever reads that
///   same store. Splitting the trait keeps a read-only client from
///   accidentally depending on write capability it will never use.
/// - What: `publish_ephemeral` should behave like a ZooKeeper ephemeral
///   node — tied to the publishing process's liveness — though
///   `InMemoryResolver` below, lacking any session concept, just treats
///   it as an ordinary insert.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn publish_ephemeral(&self, path: &str, value: &str) -> Result<()>;
    async fn withdraw(&self, path: &str) -> Result<()>;
}

#[async_trait]
impl<T: Resolver + ?Sized> Resolver for std::sync::Arc<T> {
    async fn start(&self) -> Result<()> {
        (**self).start().await
    }

    async fn get_data(&self, path: &str) -> Result<String> {
        (**self).get_data(path).await
    }
}

/// An in-process coordination store, suitable for tests and the demo
/// binaries. Not meant to stand in for a real ZooKeeper-backed resolver.
#[derive(Default)]
pub struct InMemoryResolver {
    nodes: RwLock<HashMap<String, String>>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `value` at `path`, as the server provider does after
    /// binding each service's listener.
    pub fn publish(&self, path: impl Into<String>, value: impl Into<String>) {
        self.nodes.write().unwrap().insert(path.into(), value.into());
    }

    pub fn unpublish(&self, path: &str) {
        self.nodes.write().unwrap().remove(path);
    }
}

#[async_trait]
impl Resolver for InMemoryResolver {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn get_data(&self, path: &str) -> Result<String> {
        Ok(self.nodes.read().unwrap().get(path).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Registrar for InMemoryResolver {
    async fn publish_ephemeral(&self, path: &str, value: &str) -> Result<()> {
        self.publish(path, value);
        Ok(())
    }

    async fn withdraw(&self, path: &str) -> Result<()> {
        self.unpublish(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_registered_endpoint() {
        let store = InMemoryResolver::new();
        store.publish("/Svc/M", "1.2.3.4:9090");
        let adapter = ResolverAdapter::new(store);
        let (host, port) = adapter.resolve("Svc", "M").await.unwrap();
        assert_eq!(host, "1.2.3.4");
        assert_eq!(port, 9090);
    }

    #[tokio::test]
    async fn missing_node_fails_with_resolve_missing() {
        let adapter = ResolverAdapter::new(InMemoryResolver::new());
        let err = adapter.resolve("Svc", "M").await.unwrap_err();
        assert_eq!(err, RpcError::ResolveMissing { path: "/Svc/M".into() });
    }

    #[tokio::test]
    async fn value_without_colon_fails_with_resolve_invalid() {
        let store = InMemoryResolver::new();
        store.publish("/Svc/M", "1.2.3.4");
        let adapter = ResolverAdapter::new(store);
        let err = adapter.resolve("Svc", "M").await.unwrap_err();
        assert_eq!(err, RpcError::ResolveInvalid { path: "/Svc/M".into() });
    }
}
