//! Item engine orchestration.
//!
//! `Engine` composes the focused submodules so callers interact with a single API:
//! - `worker_pool` spawns the puller, filler and handler role tasks.
//! - `ack` runs the acknowledgement dispatcher that calls `on_ack`.
//! - `lifecycle` wires run-scoped cancellation, the metrics reporter, and fatal error
//!   propagation.

use super::ack::ack_channel;
use super::lifecycle::{LifecycleHandles, LifecycleSpawnParams};
use super::worker_pool::{WorkerPool, WorkerPoolParams};

use crate::queue::bridge::Bridge;
use crate::queue::stack::SharedStore;
use crate::runtime::config::EngineConfig;
use crate::runtime::fatal::report_hook_error;
use crate::runtime::hooks::{HookError, HookStage, ItemHooks};
use crate::runtime::telemetry::Telemetry;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Engine<H: ItemHooks> {
    config: EngineConfig,
    hooks: Arc<H>,
    store: SharedStore<H::Item>,
    bridge: Arc<Bridge<H::Item>>,
    telemetry: Arc<Telemetry>,
    worker_pool: WorkerPool<H>,
    lifecycle: Option<LifecycleHandles>,
    running: bool,
    shutdown_root: CancellationToken,
    owns_shutdown_root: bool,
}

impl<H: ItemHooks> Engine<H> {
    /// Creates a new engine with the given configuration and hooks.
    ///
    /// The engine creates its own root cancellation token. Use [`Self::with_cancellation_token`]
    /// if you need to integrate with an existing shutdown mechanism.
    pub fn new(config: EngineConfig, hooks: H) -> Self {
        let mut engine = Self::with_cancellation_token(config, hooks, CancellationToken::new());
        engine.owns_shutdown_root = true;
        engine
    }

    /// Creates a new engine whose per-run tokens derive from `shutdown_token`.
    ///
    /// A fatal error cancels `shutdown_token`; the caller must hand over a fresh one through
    /// [`Self::replace_shutdown_root`] before starting again.
    pub fn with_cancellation_token(
        config: EngineConfig,
        hooks: H,
        shutdown_token: CancellationToken,
    ) -> Self {
        let hooks = Arc::new(hooks);
        let store = SharedStore::default();
        let bridge = Arc::new(Bridge::new(config.capacity()));
        let telemetry = Arc::new(Telemetry::default());
        let worker_pool = WorkerPool::new(WorkerPoolParams {
            layout: config.roles(),
            hooks: hooks.clone(),
            store: store.clone(),
            bridge: bridge.clone(),
            telemetry: telemetry.clone(),
        });

        Self {
            config,
            hooks,
            store,
            bridge,
            telemetry,
            worker_pool,
            lifecycle: None,
            running: false,
            shutdown_root: shutdown_token,
            owns_shutdown_root: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hooks(&self) -> &Arc<H> {
        &self.hooks
    }

    /// Returns a handle to the item store shared with the role tasks.
    pub fn store(&self) -> &SharedStore<H::Item> {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<Bridge<H::Item>> {
        &self.bridge
    }

    /// Returns a reference to the role task handles of the current run.
    pub fn workers(&self) -> &Vec<JoinHandle<()>> {
        self.worker_pool.handles()
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Replaces the root shutdown token used to derive per-run cancellation tokens.
    /// This must only be called while the engine is idle (i.e. between `stop` and `start`).
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            !self.running,
            "shutdown token should not change while the engine is running"
        );
        self.shutdown_root = shutdown;
        self.owns_shutdown_root = false;
    }

    /// Seeds the store through `on_init` and spawns every role task.
    ///
    /// Returns an error if the engine is already running or if an `on_init` failure is escalated
    /// by `on_error`.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            bail!("engine already running");
        }

        if self.shutdown_root.is_cancelled() {
            if !self.owns_shutdown_root {
                bail!("shutdown token already cancelled; replace it before starting the engine");
            }
            // Left cancelled by the fatal handler of a previous run.
            tracing::debug!("installing a fresh shutdown root");
            self.shutdown_root = CancellationToken::new();
        }

        debug_assert!(
            self.config.validate().is_ok(),
            "EngineConfig should have been validated at construction time"
        );

        let roles = self.config.roles();
        tracing::info!(
            capacity = self.config.capacity(),
            throttle_ms = self.config.throttle().as_millis() as u64,
            pullers = roles.pullers(),
            fillers = roles.fillers(),
            handlers = roles.handlers(),
            "starting item engine"
        );

        let (ack_tx, ack_rx) = ack_channel(self.config.ack_capacity());
        let lifecycle = LifecycleHandles::spawn::<H>(LifecycleSpawnParams {
            shutdown_root: &self.shutdown_root,
            hooks: self.hooks.clone(),
            telemetry: self.telemetry.clone(),
            store: self.store.clone(),
            bridge: self.bridge.clone(),
            ack_rx,
            metrics_interval: self.config.metrics_interval(),
        });
        let fatal_handler = lifecycle.fatal_handler();
        let run_token = lifecycle.run_token.clone();

        let init_result = {
            let mut store = self.store.lock().await;
            let result = self.hooks.on_init(&mut store);
            tracing::debug!(seeded = store.len(), "store initialised");
            result
        };
        if let Err(err) = init_result {
            let reported = report_hook_error(
                self.hooks.as_ref(),
                &fatal_handler,
                &self.telemetry,
                HookError::new(HookStage::Init, err),
            );
            if let Err(err) = reported {
                drop(ack_tx);
                lifecycle.run_token.cancel();
                lifecycle.shutdown(Instant::now()).await;
                return Err(err).context("failed to initialise item store");
            }
        }

        self.worker_pool
            .launch(&self.config, run_token, fatal_handler, ack_tx);
        self.lifecycle = Some(lifecycle);
        self.running = true;

        Ok(())
    }

    /// Stops every role and background task.
    ///
    /// Running roles get `shutdown_grace` to finish before they are aborted, abandoning any
    /// in-flight `handling` call. Items still in the store or bridge are left in place. Returns
    /// the first fatal error captured during the run.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        tracing::info!("stopping item engine");

        if let Some(handles) = &self.lifecycle {
            handles.run_token.cancel();
        }
        tokio::task::yield_now().await;

        let deadline = Instant::now() + self.config.shutdown_grace();
        let abandoned = self.worker_pool.shutdown(deadline).await;
        if abandoned > 0 {
            tracing::info!(abandoned, "abandoned role tasks still running at shutdown");
        }
        tracing::debug!("item engine stop: role tasks joined");

        let mut fatal_error = None;
        if let Some(handles) = self.lifecycle.take() {
            fatal_error = handles.error();
            handles.shutdown(deadline).await;
        }

        let store_items = self.store.len().await;
        let bridge_items = self.bridge.len();
        if store_items > 0 || bridge_items > 0 {
            tracing::info!(
                store_items,
                bridge_items,
                "items left undelivered at shutdown"
            );
        }

        self.running = false;

        if let Some(err) = fatal_error {
            return Err(err).context("item pipeline aborted");
        }

        Ok(())
    }
}
