use crate::processor::ack::AckSender;
use crate::queue::bridge::Bridge;
use crate::queue::stack::SharedStore;
use crate::runtime::config::DrainPolicy;
use crate::runtime::fatal::{report_hook_error, FatalErrorHandler};
use crate::runtime::hooks::{HookError, ItemHooks};
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use super::shared::WorkerShared;
use super::types::WorkerRole;

pub struct Worker<H: ItemHooks> {
    pub id: usize,
    pub role: WorkerRole,
    pub(super) hooks: Arc<H>,
    pub(super) store: SharedStore<H::Item>,
    pub(super) bridge: Arc<Bridge<H::Item>>,
    pub(super) telemetry: Arc<Telemetry>,
    pub(super) handling_permits: Arc<Semaphore>,
    pub(super) ack_tx: AckSender<H::Item>,
    pub(super) throttle: Duration,
    pub(super) drain_policy: DrainPolicy,
    pub(super) shutdown: CancellationToken,
    pub(super) fatal_handler: Arc<FatalErrorHandler>,
}

impl<H: ItemHooks> Worker<H> {
    pub fn new(
        id: usize,
        role: WorkerRole,
        shutdown: CancellationToken,
        fatal_handler: Arc<FatalErrorHandler>,
        shared: WorkerShared<H>,
    ) -> Self {
        let WorkerShared {
            hooks,
            store,
            bridge,
            telemetry,
            handling_permits,
            ack_tx,
            throttle,
            drain_policy,
        } = shared;

        Self {
            id,
            role,
            hooks,
            store,
            bridge,
            telemetry,
            handling_permits,
            ack_tx,
            throttle,
            drain_policy,
            shutdown,
            fatal_handler,
        }
    }

    /// Runs the role loop until the run token is cancelled.
    ///
    /// An error means a hook failure was escalated to a fatal abort.
    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id, role = %self.role))]
    pub async fn run(self) -> Result<()> {
        tracing::info!(worker = self.id, role = %self.role, "worker task started");

        let result = match self.role {
            WorkerRole::Puller => self.run_puller().await,
            WorkerRole::Filler => self.run_filler().await,
            WorkerRole::Handler => self.run_handler().await,
        };

        tracing::info!(worker = self.id, role = %self.role, "worker task stopped");
        result
    }

    /// Waits out the throttle before an iteration. Returns `false` once the run is cancelled.
    pub(super) async fn pace(&self) -> bool {
        if self.throttle.is_zero() {
            tokio::task::yield_now().await;
            return !self.shutdown.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = sleep(self.throttle) => true,
        }
    }

    pub(super) fn report(&self, error: HookError) -> Result<()> {
        report_hook_error(
            self.hooks.as_ref(),
            &self.fatal_handler,
            &self.telemetry,
            error,
        )
    }
}
