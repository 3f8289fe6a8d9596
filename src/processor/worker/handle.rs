use crate::queue::item::QueueItem;
use crate::runtime::config::DrainPolicy;
use crate::runtime::hooks::{HookError, HookStage, ItemHooks};
use anyhow::Result;

use super::process::Worker;
use super::types::StepOutcome;

impl<H: ItemHooks> Worker<H> {
    pub(super) async fn run_handler(&self) -> Result<()> {
        loop {
            if !self.pace().await {
                break;
            }

            if self.handle_once().await? == StepOutcome::Cancelled {
                break;
            }
        }

        tracing::debug!(worker = self.id, "handler observed shutdown");
        Ok(())
    }

    /// Receives one item and runs `handling` on it while holding a handling permit.
    ///
    /// A failed item goes through `push_back` before the permit is released, so a filler sees
    /// it on top of the store before any other handler can run.
    pub(super) async fn handle_once(&self) -> Result<StepOutcome> {
        if self.drain_policy == DrainPolicy::PreferRefill
            && !self.bridge.is_empty()
            && self.store.is_empty().await
        {
            return Ok(StepOutcome::Idle);
        }

        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(StepOutcome::Cancelled),
            permit = self.handling_permits.acquire() => permit,
        };
        let Ok(permit) = permit else {
            return Ok(StepOutcome::Cancelled);
        };
        let Some(item) = self.bridge.recv(&self.shutdown).await else {
            return Ok(StepOutcome::Cancelled);
        };

        let key = item.key();
        let index = item.index();

        match self.hooks.handling(&item).await {
            Ok(()) => {
                drop(permit);
                self.telemetry.record_handled();
                tracing::debug!(worker = self.id, key = %key, index, "item handled");
                Ok(self.acknowledge(item).await)
            }
            Err(err) => {
                self.telemetry.record_failed();
                let push_back = {
                    let mut store = self.store.lock().await;
                    self.hooks.push_back(&mut store, item)
                };
                drop(permit);

                if push_back.is_ok() {
                    self.telemetry.record_pushed_back();
                }
                tracing::warn!(
                    worker = self.id,
                    key = %key,
                    index,
                    error = %err,
                    "handling failed; item handed to push_back"
                );

                self.report(HookError::new(HookStage::Handling, err).with_key(key.clone()))?;
                if let Err(err) = push_back {
                    self.report(HookError::new(HookStage::PushBack, err).with_key(key))?;
                }
                Ok(StepOutcome::Progressed)
            }
        }
    }

    /// Queues a handled item for `on_ack`.
    ///
    /// Not raced against the run token: an item handled during the shutdown grace period is
    /// still acknowledged, and the dispatcher keeps draining until every handler has exited.
    async fn acknowledge(&self, item: H::Item) -> StepOutcome {
        if self.ack_tx.send(item).await.is_err() {
            tracing::debug!(worker = self.id, "ack dispatcher gone; acknowledgement dropped");
        }
        StepOutcome::Progressed
    }
}
