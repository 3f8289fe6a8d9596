use crate::queue::bridge::Bridge;
use crate::queue::stack::SharedStore;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing item flow through the engine.
#[derive(Default, Debug)]
pub struct Telemetry {
    pulled: AtomicU64,
    dispatched: AtomicU64,
    handled: AtomicU64,
    failed: AtomicU64,
    pushed_back: AtomicU64,
    acked: AtomicU64,
    hook_errors: AtomicU64,
    bridge_high_watermark: AtomicUsize,
}

impl Telemetry {
    pub fn record_pulled(&self) {
        self.pulled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, bridge_depth: usize) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.record_bridge_depth(bridge_depth);
    }

    pub fn record_bridge_depth(&self, depth: usize) {
        self.bridge_high_watermark.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pushed_back(&self) {
        self.pushed_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hook_error(&self) {
        self.hook_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            pulled: self.pulled.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pushed_back: self.pushed_back.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            hook_errors: self.hook_errors.load(Ordering::Relaxed),
            bridge_high_watermark: self.bridge_high_watermark.load(Ordering::Relaxed),
        }
    }

    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn hook_errors(&self) -> u64 {
        self.hook_errors.load(Ordering::Relaxed)
    }

    /// Deepest bridge occupancy observed since the engine was created.
    pub fn bridge_high_watermark(&self) -> usize {
        self.bridge_high_watermark.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub pulled: u64,
    pub dispatched: u64,
    pub handled: u64,
    pub failed: u64,
    pub pushed_back: u64,
    pub acked: u64,
    pub hook_errors: u64,
    pub bridge_high_watermark: usize,
}

/// Spawns a background task that periodically logs throughput, store length, and bridge depth.
pub fn spawn_metrics_reporter<I: Send + 'static>(
    telemetry: Arc<Telemetry>,
    store: SharedStore<I>,
    bridge: Arc<Bridge<I>>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "pullstack::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let handled_delta = current_snapshot
                        .handled
                        .saturating_sub(last_snapshot.handled);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        handled_delta as f64 / elapsed
                    };
                    let store_items = store.len().await;
                    let bridge_depth = bridge.len();
                    telemetry.record_bridge_depth(bridge_depth);

                    tracing::info!(
                        target: "pullstack::metrics",
                        throughput = format!("{throughput:.2}"),
                        pulled = current_snapshot.pulled,
                        handled = current_snapshot.handled,
                        failed = current_snapshot.failed,
                        acked = current_snapshot.acked,
                        store_items,
                        bridge_depth,
                        bridge_capacity = bridge.capacity(),
                        hook_errors = current_snapshot.hook_errors,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
