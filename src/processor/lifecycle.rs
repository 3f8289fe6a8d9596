//! Lifecycle orchestration for `Engine`.

use crate::processor::ack::{spawn_ack_dispatcher, AckDispatcherParams, AckReceiver};
use crate::queue::bridge::Bridge;
use crate::queue::stack::SharedStore;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::hooks::ItemHooks;
use crate::runtime::telemetry::{self, Telemetry};
use anyhow::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

pub(crate) struct LifecycleHandles {
    pub run_token: CancellationToken,
    fatal_handler: Arc<FatalErrorHandler>,
    metrics_handle: Option<JoinHandle<()>>,
    ack_handle: Option<JoinHandle<()>>,
}

pub(crate) struct LifecycleSpawnParams<'a, H: ItemHooks> {
    pub shutdown_root: &'a CancellationToken,
    pub hooks: Arc<H>,
    pub telemetry: Arc<Telemetry>,
    pub store: SharedStore<H::Item>,
    pub bridge: Arc<Bridge<H::Item>>,
    pub ack_rx: AckReceiver<H::Item>,
    pub metrics_interval: Duration,
}

impl LifecycleHandles {
    pub(crate) fn spawn<H: ItemHooks>(params: LifecycleSpawnParams<'_, H>) -> Self {
        let LifecycleSpawnParams {
            shutdown_root,
            hooks,
            telemetry,
            store,
            bridge,
            ack_rx,
            metrics_interval,
        } = params;

        let run_token = shutdown_root.child_token();
        let fatal_handler = Arc::new(FatalErrorHandler::new(
            shutdown_root.clone(),
            run_token.clone(),
        ));
        let metrics_handle = telemetry::spawn_metrics_reporter(
            telemetry.clone(),
            store,
            bridge,
            run_token.clone(),
            metrics_interval,
        );
        let ack_handle = spawn_ack_dispatcher(AckDispatcherParams {
            hooks,
            ack_rx,
            fatal_handler: fatal_handler.clone(),
            telemetry,
        });

        Self {
            run_token,
            fatal_handler,
            metrics_handle: Some(metrics_handle),
            ack_handle: Some(ack_handle),
        }
    }

    pub(crate) fn fatal_handler(&self) -> Arc<FatalErrorHandler> {
        self.fatal_handler.clone()
    }

    pub(crate) fn error(&self) -> Option<Error> {
        self.fatal_handler.error()
    }

    /// Joins the background tasks, aborting whichever is still busy at `deadline`.
    pub(crate) async fn shutdown(mut self, deadline: Instant) {
        if let Some(handle) = self.ack_handle.take() {
            if !join_or_abort(handle, deadline).await {
                tracing::debug!("ack dispatcher abandoned after grace period");
            }
        }

        if let Some(handle) = self.metrics_handle.take() {
            join_or_abort(handle, deadline).await;
        }
    }
}

/// Waits for `handle` until `deadline`, then aborts it.
///
/// Returns `true` when the task finished on its own. A task that is already done is joined
/// even when the deadline has passed.
pub(crate) async fn join_or_abort(mut handle: JoinHandle<()>, deadline: Instant) -> bool {
    match time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            if !err.is_cancelled() {
                tracing::warn!(error = %err, "background task terminated unexpectedly");
            }
            true
        }
        Err(_) => {
            handle.abort();
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::warn!(error = %err, "background task panicked while aborting");
                }
            }
            false
        }
    }
}
