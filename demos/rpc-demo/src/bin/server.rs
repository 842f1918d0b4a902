//! Demo RPC server: registers the cache service and the example user
//! service, publishes both to the in-process coordination store, and
//! runs the accept loop.

use std::sync::Arc;

use rpc_cache::CacheEngine;
use rpc_core::descriptor::ServiceRegistry;
use rpc_core::InMemoryResolver;
use rpc_demo::config;
use rpc_transport_tcp::ServerProvider;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = config::parse_cli_path(&args);
    let app_config = config::AppConfig::load(&config_path).unwrap_or_else(|err| {
        eprintln!("failed to load config: {err}");
        std::process::exit(1);
    });
    config::init(app_config);
    let app_config = config::global();

    let store = Arc::new(InMemoryResolver::new());
    let cache_engine = Arc::new(CacheEngine::new());
    rpc_cache::spawn_sweeper(Arc::clone(&cache_engine));

    // A standalone registry the user service dispatches session checks
    // into directly (in-process, not a second TCP round trip), backed by
    // the same cache engine the provider serves over the wire.
    let mut standalone_cache_registry = ServiceRegistry::new();
    rpc_cache::register(&mut standalone_cache_registry, Arc::clone(&cache_engine));
    let standalone_cache_registry = Arc::new(standalone_cache_registry);

    let mut provider = ServerProvider::new(Arc::clone(&store));
    rpc_cache::register(provider.registry_mut(), Arc::clone(&cache_engine));
    rpc_demo::user_service::register(provider.registry_mut(), standalone_cache_registry);

    let provider = Arc::new(provider);
    let bind_addr = format!("{}:{}", app_config.rpc_server_ip, app_config.rpc_server_port)
        .parse()
        .expect("rpcserverip/rpcserverport must form a valid socket address");

    info!(target: "rpc_demo::server", %bind_addr, "starting RPC server");
    if let Err(err) = provider.run(bind_addr, &app_config.rpc_server_ip, app_config.rpc_server_port).await {
        eprintln!("server exited with error: {err}");
        std::process::exit(1);
    }
}
