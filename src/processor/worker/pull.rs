use crate::queue::item::QueueItem;
use crate::runtime::hooks::{HookDecision, HookError, HookStage, ItemHooks};
use anyhow::Result;

use super::process::Worker;

impl<H: ItemHooks> Worker<H> {
    /// Feeds the store from `pulling` until cancelled or until the source fails.
    pub(super) async fn run_puller(&self) -> Result<()> {
        loop {
            if !self.pace().await {
                break;
            }

            let decision = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => HookDecision::Cancelled,
                result = self.hooks.pulling() => HookDecision::Finished(result),
            };

            match decision {
                HookDecision::Cancelled => break,
                HookDecision::Finished(Ok(Some(item))) => {
                    let key = item.key();
                    let index = item.index();
                    self.store.push(item).await;
                    self.telemetry.record_pulled();
                    tracing::trace!(worker = self.id, key = %key, index, "item pulled into store");
                }
                HookDecision::Finished(Ok(None)) => {}
                HookDecision::Finished(Err(err)) => {
                    tracing::warn!(
                        worker = self.id,
                        error = %err,
                        "pulling failed; puller stops"
                    );
                    self.report(HookError::new(HookStage::Pulling, err))?;
                    return Ok(());
                }
            }
        }

        tracing::debug!(worker = self.id, "puller observed shutdown");
        Ok(())
    }
}
