//! Example application service: `Login`/`Register`, wired to cache user
//! sessions through the same cache service other clients talk to over
//! RPC — showing how ordinary application code composes on the
//! framework rather than being part of it.

use std::sync::Arc;

use rpc_cache::messages::{GetRequest, ResultCode, SetRequest};
use rpc_cache::service::SERVICE_NAME as CACHE_SERVICE_NAME;
use rpc_core::descriptor::{FnMethodHandler, ServiceRegistry};
use rpc_core::message::Message;
use rpc_core::Controller;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const SERVICE_NAME: &str = "UserService";

/// Session TTL applied to a successful login.
const SESSION_TTL_SECONDS: u32 = 3600;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub name: String,
    pub pwd: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub result: ResultCode,
    pub success: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub id: u32,
    pub name: String,
    pub pwd: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub result: ResultCode,
    pub success: bool,
}

fn session_key(name: &str) -> String {
    format!("session:{name}")
}

/// Caches a session token for `name` by calling straight into the cache
/// engine in-process when `cache_registry` is Some, mirroring the
/// original's pattern of the user service holding its own cache client —
/// collapsed here to a direct registry dispatch since both services run
/// in the same provider.
async fn cache_login_session(cache_registry: &ServiceRegistry, name: &str) {
    let payload = SetRequest { key: session_key(name), value: "active".into(), expire_seconds: SESSION_TTL_SECONDS }
        .encode()
        .expect("serialize request fail");
    let _ = cache_registry.dispatch(CACHE_SERVICE_NAME, "Set", Controller::new(), payload).await;
}

async fn has_active_session(cache_registry: &ServiceRegistry, name: &str) -> bool {
    let Ok(payload) = (GetRequest { key: session_key(name) }).encode() else {
        return false;
    };
    let Ok(reply) = cache_registry.dispatch(CACHE_SERVICE_NAME, "Get", Controller::new(), payload).await else {
        return false;
    };
    rpc_cache::messages::GetResponse::decode(&reply).map(|r| r.exists).unwrap_or(false)
}

/// Registers `Login` and `Register` under [`SERVICE_NAME`]. `cache_registry`
/// is the same registry the cache service was registered into, so the
/// dispatch call below is in-process, not a second TCP round trip.
///
/// - Why: an application service that needs another service's behavior
///   doesn't need a loopback socket to get it — both run under the same
///   provider in this process, so a direct `ServiceRegistry::dispatch`
///   call is the entire integration.
pub fn register(registry: &mut ServiceRegistry, cache_registry: Arc<ServiceRegistry>) {
    let login_cache = Arc::clone(&cache_registry);
    registry.register(
        SERVICE_NAME,
        "Login",
        FnMethodHandler::new(move |_ctl: Controller, req: LoginRequest| {
            let cache_registry = Arc::clone(&login_cache);
            async move {
                let renewed = has_active_session(&cache_registry, &req.name).await;
                info!(target: "rpc_demo::user_service", name = %req.name, renewed, "login attempt");
                cache_login_session(&cache_registry, &req.name).await;
                LoginResponse { result: ResultCode::ok(), success: true }
            }
        }),
    );

    registry.register(
        SERVICE_NAME,
        "Register",
        FnMethodHandler::new(move |_ctl: Controller, req: RegisterRequest| async move {
            info!(target: "rpc_demo::user_service", id = req.id, name = %req.name, "register");
            RegisterResponse { result: ResultCode::ok(), success: true }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_cache::engine::CacheEngine;

    #[tokio::test]
    async fn login_caches_a_session_and_is_observable_via_cache_service() {
        let mut cache_registry = ServiceRegistry::new();
        rpc_cache::service::register(&mut cache_registry, Arc::new(CacheEngine::new()));
        let cache_registry = Arc::new(cache_registry);

        let mut user_registry = ServiceRegistry::new();
        register(&mut user_registry, Arc::clone(&cache_registry));

        let payload = LoginRequest { name: "alice".into(), pwd: "secret".into() }.encode().unwrap();
        let reply = user_registry.dispatch(SERVICE_NAME, "Login", Controller::new(), payload).await.unwrap();
        let login: LoginResponse = Message::decode(&reply).unwrap();
        assert!(login.success);

        assert!(has_active_session(&cache_registry, "alice").await);
        assert!(!has_active_session(&cache_registry, "bob").await);
    }
}
