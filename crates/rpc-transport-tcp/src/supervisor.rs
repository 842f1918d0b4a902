//! Heartbeat supervisor: tracks which registered endpoints are assumed
//! reachable and evicts ones whose TCP reachability has lapsed.
//!
//! Membership in the registry *is* the availability signal: an entry
//! present means "assumed reachable", removal means "declared down".
//! A background sweeper runs on a fixed cadence, probing each entry and
//! erasing it once its `last_ok` budget is exhausted. The registry is a
//! `DashMap` (the same concurrent-map choice used elsewhere in this
//! workspace for shared registries) so probes don't serialize behind one
//! global lock the way a single `Mutex<HashMap<_>>` would.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, warn};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PROBE_DEADLINE: Duration = Duration::from_secs(3);

/// Default timeout budget for an endpoint entry when the caller doesn't
/// specify one, matching the wire contract's default.
pub const DEFAULT_ENDPOINT_TIMEOUT_MS: u64 = 15_000;

type ProbeFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// An async `(ip, port) -> reachable` probe, pluggable via
/// [`Supervisor::set_heartbeat_callback`].
pub trait HeartbeatProbe: Send + Sync {
    fn probe(&self, ip: String, port: u16) -> ProbeFuture;
}

impl<F, Fut> HeartbeatProbe for F
where
    F: Fn(String, u16) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn probe(&self, ip: String, port: u16) -> ProbeFuture {
        Box::pin(self(ip, port))
    }
}

#[derive(Debug, Clone)]
struct EndpointEntry {
    ip: String,
    port: u16,
    timeout_ms: u64,
    last_ok: Instant,
}

/// Process-wide (or test-scoped) registry of endpoints under heartbeat
/// watch, plus the background sweeper that evicts stale ones.
///
/// - Why: `is_available` needs to answer instantly, on the hot path of
///   every call a channel makes — it can't itself block on a network
///   probe. Pushing the actual probing onto a background sweeper means
///   the answer is always just a map lookup.
/// - What: membership is the signal. `register` adds an entry stamped
///   `last_ok = now`; the sweeper either refreshes `last_ok` on a
///   successful probe or removes the entry once its budget lapses —
///   there is no separate "degraded" state in between.
/// - Trade-offs: an endpoint is "available" for up to one full sweep
///   interval after it actually goes down, since eviction only happens
///   when the sweeper gets around to checking it.
pub struct Supervisor {
    registry: DashMap<String, EndpointEntry>,
    probe: RwLock<Arc<dyn HeartbeatProbe>>,
    sweep_interval: Duration,
    probe_deadline: Duration,
    stopped: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

fn default_probe(ip: String, port: u16, deadline: Duration) -> ProbeFuture {
    Box::pin(async move {
        match tokio_timeout(deadline, TcpStream::connect((ip.as_str(), port))).await {
            Ok(Ok(_stream)) => true,
            _ => false,
        }
    })
}

impl Supervisor {
    /// Builds a supervisor with the given sweep cadence; the probe
    /// deadline is fixed at the wire contract's 3 seconds.
    pub fn new(sweep_interval: Duration) -> Arc<Self> {
        Self::with_probe_deadline(sweep_interval, DEFAULT_PROBE_DEADLINE)
    }

    /// As [`Supervisor::new`], but also overrides the probe deadline —
    /// used by tests that need the whole cycle to run quickly.
    pub fn with_probe_deadline(sweep_interval: Duration, probe_deadline: Duration) -> Arc<Self> {
        let deadline = probe_deadline;
        Arc::new(Self {
            registry: DashMap::new(),
            probe: RwLock::new(Arc::new(move |ip: String, port: u16| default_probe(ip, port, deadline))),
            sweep_interval,
            probe_deadline,
            stopped: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            sweeper: std::sync::Mutex::new(None),
        })
    }

    /// The process-wide singleton, constructed lazily on first use with
    /// the wire contract's defaults and started immediately.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<Supervisor>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                let supervisor = Supervisor::new(DEFAULT_SWEEP_INTERVAL);
                supervisor.clone().start();
                supervisor
            })
            .clone()
    }

    /// Starts the background sweeper if it isn't already running.
    pub fn start(self: Arc<Self>) {
        let mut guard = self.sweeper.lock().unwrap();
        if guard.is_some() {
            return;
        }
        let supervisor = Arc::clone(&self);
        *guard = Some(tokio::spawn(async move { supervisor.sweeper_loop().await }));
    }

    /// Stops the sweeper and waits for it to exit. Safe to call more than
    /// once.
    pub async fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.shutdown.notify_waiters();
        let handle = self.sweeper.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn sweeper_loop(&self) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {}
                _ = self.shutdown.notified() => break,
            }
            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            self.sweep_once().await;
        }
    }

    /// Runs one sweep pass: evict entries past their budget, probe the
    /// rest. Exposed for tests that want a deterministic tick instead of
    /// waiting on the background task.
    ///
    /// - Contract: the registry is snapshotted (cloned key/value pairs)
    ///   before any probe runs, so the `DashMap` is never held locked
    ///   across an `.await` — a slow or hanging probe for one entry can't
    ///   block lookups or inserts for any other.
    pub async fn sweep_once(&self) {
        let snapshot: Vec<(String, String, u16, u64, Instant)> = self
            .registry
            .iter()
            .map(|entry| {
                let e = entry.value();
                (entry.key().clone(), e.ip.clone(), e.port, e.timeout_ms, e.last_ok)
            })
            .collect();

        for (key, ip, port, timeout_ms, last_ok) in snapshot {
            if last_ok.elapsed() >= Duration::from_millis(timeout_ms) {
                self.registry.remove(&key);
                warn!(target: "rpc_transport_tcp::supervisor", service_key = %key, "evicted stale endpoint");
                continue;
            }
            let probe = self.probe.read().unwrap().clone();
            let ok = probe.probe(ip, port).await;
            if ok {
                if let Some(mut entry) = self.registry.get_mut(&key) {
                    entry.last_ok = Instant::now();
                }
            } else {
                debug!(target: "rpc_transport_tcp::supervisor", service_key = %key, "heartbeat probe failed");
            }
        }
    }

    /// Inserts or replaces an entry, stamping `last_ok = now`.
    pub fn register(&self, key: impl Into<String>, ip: impl Into<String>, port: u16, timeout_ms: u64) {
        self.registry.insert(
            key.into(),
            EndpointEntry { ip: ip.into(), port, timeout_ms, last_ok: Instant::now() },
        );
    }

    pub fn unregister(&self, key: &str) {
        self.registry.remove(key);
    }

    /// Membership is the availability signal.
    pub fn is_available(&self, key: &str) -> bool {
        self.registry.contains_key(key)
    }

    /// Runs one synchronous probe against `key`, updating `last_ok` on
    /// success. Does not itself evict on failure — the sweeper owns
    /// eviction.
    pub async fn trigger_heartbeat(&self, key: &str) -> bool {
        let Some((ip, port)) = self.registry.get(key).map(|e| (e.ip.clone(), e.port)) else {
            return false;
        };
        let probe = self.probe.read().unwrap().clone();
        let ok = probe.probe(ip, port).await;
        if ok {
            if let Some(mut entry) = self.registry.get_mut(key) {
                entry.last_ok = Instant::now();
            }
        } else {
            debug!(target: "rpc_transport_tcp::supervisor", service_key = %key, "manual heartbeat failed");
        }
        ok
    }

    /// Overrides the probe used by both `trigger_heartbeat` and the
    /// sweeper.
    pub fn set_heartbeat_callback(&self, probe: impl HeartbeatProbe + 'static) {
        *self.probe.write().unwrap() = Arc::new(probe);
    }

    pub fn probe_deadline(&self) -> Duration {
        self.probe_deadline
    }
}
