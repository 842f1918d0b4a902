//! Registers the cache engine's operations as RPC methods.

use std::sync::Arc;

use rpc_core::descriptor::{FnMethodHandler, ServiceRegistry};
use rpc_core::Controller;

use crate::engine::CacheEngine;
use crate::messages::{
    BatchGetRequest, BatchGetResponse, DeleteRequest, ExistsRequest, ExistsResponse, GetRequest, GetResponse,
    ResultCode, SetRequest, SetResponse, StatsRequest, StatsResponse,
};

/// Service name the cache methods are published under.
pub const SERVICE_NAME: &str = "CacheService";

/// Registers `Set`, `Get`, `Delete`, `Exists`, `BatchGet` and `GetStats`
/// against `engine` into `registry`, under [`SERVICE_NAME`].
///
/// - What: each handler clones `engine`'s `Arc` once at registration time
///   and again per-call inside the closure, so the registry can be
///   cloned or shared across an arbitrary number of connections without
///   any of them contending on anything beyond what `CacheEngine` itself
///   locks.
pub fn register(registry: &mut ServiceRegistry, engine: Arc<CacheEngine>) {
    let set_engine = Arc::clone(&engine);
    registry.register(
        SERVICE_NAME,
        "Set",
        FnMethodHandler::new(move |_ctl: Controller, req: SetRequest| {
            let engine = Arc::clone(&set_engine);
            async move { engine.set(req.key, req.value, req.expire_seconds) }
        }),
    );

    let get_engine = Arc::clone(&engine);
    registry.register(
        SERVICE_NAME,
        "Get",
        FnMethodHandler::new(move |_ctl: Controller, req: GetRequest| {
            let engine = Arc::clone(&get_engine);
            async move {
                let (result, value, exists, expire_time) = engine.get(&req.key);
                GetResponse { result, value, exists, expire_time }
            }
        }),
    );

    let delete_engine = Arc::clone(&engine);
    registry.register(
        SERVICE_NAME,
        "Delete",
        FnMethodHandler::new(move |_ctl: Controller, req: DeleteRequest| {
            let engine = Arc::clone(&delete_engine);
            async move { engine.delete(&req.key) }
        }),
    );

    let exists_engine = Arc::clone(&engine);
    registry.register(
        SERVICE_NAME,
        "Exists",
        FnMethodHandler::new(move |_ctl: Controller, req: ExistsRequest| {
            let engine = Arc::clone(&exists_engine);
            async move { ExistsResponse { result: ResultCode::ok(), exists: engine.exists(&req.key) } }
        }),
    );

    let batch_engine = Arc::clone(&engine);
    registry.register(
        SERVICE_NAME,
        "BatchGet",
        FnMethodHandler::new(move |_ctl: Controller, req: BatchGetRequest| {
            let engine = Arc::clone(&batch_engine);
            async move { BatchGetResponse { result: ResultCode::ok(), items: engine.batch_get(&req.keys) } }
        }),
    );

    let stats_engine = Arc::clone(&engine);
    registry.register(
        SERVICE_NAME,
        "GetStats",
        FnMethodHandler::new(move |_ctl: Controller, _req: StatsRequest| {
            let engine = Arc::clone(&stats_engine);
            async move {
                let (total_keys, memory_usage, hit_count, miss_count, hit_rate) = engine.stats();
                StatsResponse { result: ResultCode::ok(), total_keys, memory_usage, hit_count, miss_count, hit_rate }
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_core::message::Message;

    #[tokio::test]
    async fn set_and_get_round_trip_through_the_registry() {
        let engine = Arc::new(CacheEngine::new());
        let mut registry = ServiceRegistry::new();
        register(&mut registry, engine);

        let set_payload = SetRequest { key: "k".into(), value: "v".into(), expire_seconds: 0 }.encode().unwrap();
        let set_reply = registry.dispatch(SERVICE_NAME, "Set", Controller::new(), set_payload).await.unwrap();
        let set_result: SetResponse = Message::decode(&set_reply).unwrap();
        assert_eq!(set_result.errcode, 0);

        let get_payload = GetRequest { key: "k".into() }.encode().unwrap();
        let get_reply = registry.dispatch(SERVICE_NAME, "Get", Controller::new(), get_payload).await.unwrap();
        let get_result: GetResponse = Message::decode(&get_reply).unwrap();
        assert!(get_result.exists);
        assert_eq!(get_result.value, "v");
    }

    #[tokio::test]
    async fn get_stats_reflects_hits_and_misses() {
        let engine = Arc::new(CacheEngine::new());
        let mut registry = ServiceRegistry::new();
        register(&mut registry, Arc::clone(&engine));

        engine.set("a".into(), "1".into(), 0);
        let _ = engine.get("a");
        let _ = engine.get("missing");

        let payload = StatsRequest.encode().unwrap();
        let reply = registry.dispatch(SERVICE_NAME, "GetStats", Controller::new(), payload).await.unwrap();
        let stats: StatsResponse = Message::decode(&reply).unwrap();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }
}
