//! Demo RPC client: exercises the cache service, the user service, or
//! both ("integrated"), matching the test modes described for the
//! example CLI client.

use std::sync::Arc;
use std::time::Duration;

use rpc_cache::messages::{BatchGetRequest, DeleteRequest, ExistsRequest, GetRequest, SetRequest, StatsRequest};
use rpc_core::resolver::ResolverAdapter;
use rpc_core::{Controller, InMemoryResolver};
use rpc_demo::config;
use rpc_demo::user_service::{LoginRequest, RegisterRequest};
use rpc_transport_tcp::{ClientChannel, Supervisor};
use tracing::info;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cache,
    User,
    Integrated,
}

fn parse_args(args: &[String]) -> (Mode, Vec<String>) {
    let mut mode = Mode::Integrated;
    let mut rest = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--cache" => mode = Mode::Cache,
            "--user" => mode = Mode::User,
            "--integrated" => mode = Mode::Integrated,
            other => rest.push(other.to_string()),
        }
    }
    (mode, rest)
}

fn channel_for(
    store: &Arc<InMemoryResolver>,
    server_addr: &str,
    service: &str,
    method: &str,
) -> ClientChannel<Arc<InMemoryResolver>> {
    store.publish(format!("/{service}/{method}"), server_addr);
    let resolver = Arc::new(ResolverAdapter::new(Arc::clone(store)));
    let supervisor = Supervisor::new(Duration::from_secs(5));
    ClientChannel::new(resolver, supervisor, service, method)
}

async fn run_cache_demo(store: &Arc<InMemoryResolver>, server_addr: &str) {
    let controller = Controller::new();

    let set_channel = channel_for(store, server_addr, "CacheService", "Set");
    let set_reply = set_channel
        .call_method::<SetRequest, rpc_cache::messages::ResultCode>(
            &controller,
            &SetRequest { key: "a".into(), value: "1".into(), expire_seconds: 0 },
        )
        .await
        .expect("cache Set call failed");
    info!(target: "rpc_demo::client", errcode = set_reply.errcode, "cache Set done");

    let get_channel = channel_for(store, server_addr, "CacheService", "Get");
    let get_reply = get_channel
        .call_method::<GetRequest, rpc_cache::messages::GetResponse>(&controller, &GetRequest { key: "a".into() })
        .await
        .expect("cache Get call failed");
    info!(target: "rpc_demo::client", value = %get_reply.value, exists = get_reply.exists, "cache Get done");

    let exists_channel = channel_for(store, server_addr, "CacheService", "Exists");
    let _ = exists_channel
        .call_method::<ExistsRequest, rpc_cache::messages::ExistsResponse>(
            &controller,
            &ExistsRequest { key: "a".into() },
        )
        .await;

    let batch_channel = channel_for(store, server_addr, "CacheService", "BatchGet");
    let _ = batch_channel
        .call_method::<BatchGetRequest, rpc_cache::messages::BatchGetResponse>(
            &controller,
            &BatchGetRequest { keys: vec!["a".into(), "b".into()] },
        )
        .await;

    let delete_channel = channel_for(store, server_addr, "CacheService", "Delete");
    let _ = delete_channel
        .call_method::<DeleteRequest, rpc_cache::messages::ResultCode>(&controller, &DeleteRequest { key: "a".into() })
        .await;

    let stats_channel = channel_for(store, server_addr, "CacheService", "GetStats");
    let stats_reply = stats_channel
        .call_method::<StatsRequest, rpc_cache::messages::StatsResponse>(&controller, &StatsRequest)
        .await
        .expect("cache GetStats call failed");
    info!(target: "rpc_demo::client", hit_rate = stats_reply.hit_rate, "cache GetStats done");
}

async fn run_user_demo(store: &Arc<InMemoryResolver>, server_addr: &str) {
    let controller = Controller::new();

    let login_channel = channel_for(store, server_addr, "UserService", "Login");
    let login_reply = login_channel
        .call_method::<LoginRequest, rpc_demo::user_service::LoginResponse>(
            &controller,
            &LoginRequest { name: "alice".into(), pwd: "secret".into() },
        )
        .await
        .expect("user Login call failed");
    info!(target: "rpc_demo::client", success = login_reply.success, "user Login done");

    let register_channel = channel_for(store, server_addr, "UserService", "Register");
    let register_reply = register_channel
        .call_method::<RegisterRequest, rpc_demo::user_service::RegisterResponse>(
            &controller,
            &RegisterRequest { id: 7, name: "bob".into(), pwd: "hunter2".into() },
        )
        .await
        .expect("user Register call failed");
    info!(target: "rpc_demo::client", success = register_reply.success, "user Register done");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let (mode, rest) = parse_args(&raw_args);
    let config_path = config::parse_cli_path(&rest);
    let app_config = config::AppConfig::load(&config_path).unwrap_or_else(|err| {
        eprintln!("failed to load config: {err}");
        std::process::exit(1);
    });
    let server_addr = format!("{}:{}", app_config.rpc_server_ip, app_config.rpc_server_port);
    config::init(app_config);

    let store = Arc::new(InMemoryResolver::new());

    match mode {
        Mode::Cache => run_cache_demo(&store, &server_addr).await,
        Mode::User => run_user_demo(&store, &server_addr).await,
        Mode::Integrated => {
            run_cache_demo(&store, &server_addr).await;
            run_user_demo(&store, &server_addr).await;
        }
    }
}
