//! Worker pool orchestration for [`Engine`](crate::processor::engine::Engine).
//!
//! Owns role task creation from a [`RoleLayout`], panic and error capture for every role,
//! and the bounded join used when the engine stops.

use crate::processor::ack::AckSender;
use crate::processor::lifecycle::join_or_abort;
use crate::processor::worker::{RoleLayout, Worker, WorkerShared, WorkerSharedParams};
use crate::queue::bridge::Bridge;
use crate::queue::stack::SharedStore;
use crate::runtime::config::EngineConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::hooks::ItemHooks;
use crate::runtime::telemetry::Telemetry;
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) struct WorkerPool<H: ItemHooks> {
    layout: RoleLayout,
    hooks: Arc<H>,
    store: SharedStore<H::Item>,
    bridge: Arc<Bridge<H::Item>>,
    telemetry: Arc<Telemetry>,
    workers: Vec<JoinHandle<()>>,
}

pub(crate) struct WorkerPoolParams<H: ItemHooks> {
    pub layout: RoleLayout,
    pub hooks: Arc<H>,
    pub store: SharedStore<H::Item>,
    pub bridge: Arc<Bridge<H::Item>>,
    pub telemetry: Arc<Telemetry>,
}

impl<H: ItemHooks> WorkerPool<H> {
    pub(crate) fn new(params: WorkerPoolParams<H>) -> Self {
        Self {
            layout: params.layout,
            hooks: params.hooks,
            store: params.store,
            bridge: params.bridge,
            telemetry: params.telemetry,
            workers: Vec::new(),
        }
    }

    pub(crate) fn handles(&self) -> &Vec<JoinHandle<()>> {
        &self.workers
    }

    /// Spawns one task per role in the layout. Handling permits are fresh for every run.
    pub(crate) fn launch(
        &mut self,
        config: &EngineConfig,
        run_token: CancellationToken,
        fatal_handler: Arc<FatalErrorHandler>,
        ack_tx: AckSender<H::Item>,
    ) {
        self.workers.clear();

        let shared = WorkerShared::new(WorkerSharedParams {
            hooks: self.hooks.clone(),
            store: self.store.clone(),
            bridge: self.bridge.clone(),
            telemetry: self.telemetry.clone(),
            handling_permits: Arc::new(Semaphore::new(config.handling_concurrency())),
            ack_tx,
            throttle: config.throttle(),
            drain_policy: config.drain_policy(),
        });

        for (worker_id, role) in self.layout.roles().enumerate() {
            let worker = Worker::new(
                worker_id,
                role,
                run_token.clone(),
                fatal_handler.clone(),
                shared.clone(),
            );
            let handle = tokio::spawn(supervise(worker, fatal_handler.clone()));
            self.workers.push(handle);
        }

        tracing::debug!(
            pullers = self.layout.pullers(),
            fillers = self.layout.fillers(),
            handlers = self.layout.handlers(),
            "role tasks launched"
        );
    }

    /// Joins every role task, aborting those still running at `deadline`.
    ///
    /// The run token must already be cancelled. Returns how many tasks were abandoned.
    pub(crate) async fn shutdown(&mut self, deadline: Instant) -> usize {
        let mut abandoned = 0usize;
        for (worker_id, handle) in std::mem::take(&mut self.workers).into_iter().enumerate() {
            if !join_or_abort(handle, deadline).await {
                tracing::debug!(worker = worker_id, "role task abandoned after grace period");
                abandoned += 1;
            }
        }
        abandoned
    }
}

/// Drives one role to completion and turns an error exit or a panic into a fatal error.
async fn supervise<H: ItemHooks>(worker: Worker<H>, fatal_handler: Arc<FatalErrorHandler>) {
    let label = format!("{} {}", worker.role, worker.id);
    let outcome = std::panic::AssertUnwindSafe(worker.run())
        .catch_unwind()
        .await;

    let (context, error) = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => {
            tracing::error!(worker = %label, error = %err, "role exited with error");
            let context = format!("{label} exited with error");
            let error = err.context(context.clone());
            (context, error)
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            tracing::error!(worker = %label, panic = %reason, "role panicked");
            (
                format!("{label} panicked"),
                anyhow::anyhow!("{label} panicked: {reason}"),
            )
        }
    };
    fatal_handler.trigger_external(&context, error);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
