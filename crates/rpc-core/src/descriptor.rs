//! Descriptor-driven dispatch.
//!
//! Rather than services subclassing a generated base (the pattern the
//! original framework borrows from protobuf service stubs), each method
//! is registered as a name plus a boxed handler in a
//! `service_name -> method_name -> handler` table. The server provider
//! looks a request up by name and calls through the table — no run-time
//! subtype relationship between services is required.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::controller::Controller;
use crate::error::{Result, RpcError};
use crate::message::Message;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A single registered method: decode the payload, run the handler,
/// encode the reply.
pub trait MethodHandler: Send + Sync {
    fn invoke(&self, controller: Controller, payload: Bytes) -> BoxFuture<Result<Bytes>>;
}

/// Adapts an `async fn(Controller, Req) -> Resp` closure into a
/// [`MethodHandler`], handling decode/encode so service authors only
/// write the typed business logic.
pub struct FnMethodHandler<F> {
    logic: Arc<F>,
}

impl<F> FnMethodHandler<F> {
    pub fn new(logic: F) -> Self {
        Self { logic: Arc::new(logic) }
    }
}

impl<F, Req, Resp, Fut> MethodHandler for FnMethodHandler<F>
where
    F: Fn(Controller, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
    Req: Message,
    Resp: Message,
{
    fn invoke(&self, controller: Controller, payload: Bytes) -> BoxFuture<Result<Bytes>> {
        let logic = Arc::clone(&self.logic);
        Box::pin(async move {
            let request = Req::decode(&payload)?;
            let response = logic(controller, request).await;
            response.encode()
        })
    }
}

/// `service_name -> { method_name -> handler }`, built once via
/// [`ServiceRegistry::register`] before the server starts accepting
/// connections, then read-only for the server's lifetime.
///
/// - Why: the original protobuf-service-stub pattern requires every
///   service to subclass a generated base type. Here a service is just a
///   set of `(name, handler)` pairs registered into a shared table —
///   adding a service means calling `register` a few times, not
///   implementing a trait with one method per RPC.
/// - What: `dispatch` is the only way in; it looks up the handler by
///   `(service_name, method_name)`, decodes the payload, runs the
///   handler, and encodes the reply, all inside a `tokio::spawn` so a
///   panic in application code can't take the caller down with it.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, HashMap<String, Arc<dyn MethodHandler>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        handler: impl MethodHandler + 'static,
    ) {
        self.services
            .entry(service_name.into())
            .or_default()
            .insert(method_name.into(), Arc::new(handler));
    }

    /// Names of every registered `(service, method)` pair, for
    /// publishing to the coordination store after binding.
    pub fn method_paths(&self) -> Vec<(String, String)> {
        self.services
            .iter()
            .flat_map(|(service, methods)| {
                methods.keys().map(move |method| (service.clone(), method.clone()))
            })
            .collect()
    }

    /// Looks up and invokes the matching handler. A method that panics
    /// while running is caught and reported as [`RpcError::HandlerPanicked`]
    /// rather than taking the accept loop down with it.
    pub async fn dispatch(
        &self,
        service_name: &str,
        method_name: &str,
        controller: Controller,
        payload: Bytes,
    ) -> Result<Bytes> {
        let handler = self
            .services
            .get(service_name)
            .and_then(|methods| methods.get(method_name))
            .ok_or_else(|| RpcError::MethodNotFound {
                service: service_name.to_string(),
                method: method_name.to_string(),
            })?;

        let future = handler.invoke(controller, payload);
        match tokio::spawn(future).await {
            Ok(result) => result,
            Err(_join_error) => Err(RpcError::HandlerPanicked {
                service: service_name.to_string(),
                method: method_name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Echo {
        value: String,
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let mut registry = ServiceRegistry::new();
        registry.register(
            "Echo",
            "Say",
            FnMethodHandler::new(|_ctl: Controller, req: Echo| async move { req }),
        );

        let payload = Echo { value: "hi".into() }.encode().unwrap();
        let reply = registry
            .dispatch("Echo", "Say", Controller::new(), payload)
            .await
            .unwrap();
        let decoded = Echo::decode(&reply).unwrap();
        assert_eq!(decoded.value, "hi");
    }

    #[tokio::test]
    async fn unknown_method_fails_not_found() {
        let registry = ServiceRegistry::new();
        let err = registry
            .dispatch("Echo", "Say", Controller::new(), Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::MethodNotFound { service: "Echo".into(), method: "Say".into() }
        );
    }

    #[tokio::test]
    async fn panicking_handler_reports_handler_panicked() {
        let mut registry = ServiceRegistry::new();
        registry.register(
            "Echo",
            "Boom",
            FnMethodHandler::new(|_ctl: Controller, _req: Echo| async move {
                panic!("boom");
                #[allow(unreachable_code)]
                Echo { value: String::new() }
            }),
        );
        let payload = Echo { value: "x".into() }.encode().unwrap();
        let err = registry
            .dispatch("Echo", "Boom", Controller::new(), payload)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RpcError::HandlerPanicked { service: "Echo".into(), method: "Boom".into() }
        );
    }
}
