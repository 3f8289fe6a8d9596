use crate::queue::item::QueueItem;
use crate::runtime::hooks::ItemHooks;
use anyhow::Result;

use super::process::Worker;
use super::types::StepOutcome;

impl<H: ItemHooks> Worker<H> {
    /// Moves items from the store into the bridge in activations of at most `capacity` steps.
    pub(super) async fn run_filler(&self) -> Result<()> {
        let capacity = self.bridge.capacity();

        'activation: loop {
            for _ in 0..capacity {
                if !self.pace().await {
                    break 'activation;
                }

                if self.fill_once().await == StepOutcome::Cancelled {
                    break 'activation;
                }

                if self.bridge.is_full() {
                    break;
                }
            }
        }

        tracing::debug!(worker = self.id, "filler observed shutdown");
        Ok(())
    }

    /// Pops the top of the store once a bridge slot is reserved, so the popped item is never
    /// held outside both containers.
    pub(super) async fn fill_once(&self) -> StepOutcome {
        if self.store.is_empty().await {
            return StepOutcome::Idle;
        }

        let Some(permit) = self.bridge.reserve(&self.shutdown).await else {
            return StepOutcome::Cancelled;
        };
        let Some(item) = self.store.pop().await else {
            return StepOutcome::Idle;
        };

        self.hooks.on_pulled(&item);
        tracing::trace!(
            worker = self.id,
            key = %item.key(),
            index = item.index(),
            "item moved into bridge"
        );
        permit.send(item);
        self.telemetry.record_dispatched(self.bridge.len());

        StepOutcome::Progressed
    }
}
