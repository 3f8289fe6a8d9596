//! Acknowledgement dispatch.
//!
//! Handlers never call `on_ack` themselves. Successfully handled items are queued on a bounded
//! channel and a single dispatcher task invokes the hook in completion order, so a slow
//! observer throttles handlers through channel backpressure instead of piling up tasks.
//!
//! The dispatcher ignores the run token. It runs until every sender is dropped, which happens
//! once all role tasks have exited, or until the engine aborts it at the shutdown deadline.

use crate::queue::item::QueueItem;
use crate::runtime::fatal::{report_hook_error, FatalErrorHandler};
use crate::runtime::hooks::{HookError, HookStage, ItemHooks};
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type AckSender<I> = mpsc::Sender<I>;
pub type AckReceiver<I> = mpsc::Receiver<I>;

pub fn ack_channel<I>(capacity: usize) -> (AckSender<I>, AckReceiver<I>) {
    mpsc::channel(capacity.max(1))
}

pub(crate) struct AckDispatcherParams<H: ItemHooks> {
    pub hooks: Arc<H>,
    pub ack_rx: AckReceiver<H::Item>,
    pub fatal_handler: Arc<FatalErrorHandler>,
    pub telemetry: Arc<Telemetry>,
}

pub(crate) fn spawn_ack_dispatcher<H: ItemHooks>(params: AckDispatcherParams<H>) -> JoinHandle<()> {
    let AckDispatcherParams {
        hooks,
        mut ack_rx,
        fatal_handler,
        telemetry,
    } = params;

    tokio::spawn(async move {
        loop {
            let Some(item) = ack_rx.recv().await else {
                tracing::debug!("ack channel closed");
                break;
            };

            let key = item.key();
            let index = item.index();
            match hooks.on_ack(item).await {
                Ok(()) => {
                    telemetry.record_acked();
                    tracing::trace!(key = %key, index, "item acknowledged");
                }
                Err(err) => {
                    let error = HookError::new(HookStage::Ack, err).with_key(key);
                    if report_hook_error(hooks.as_ref(), &fatal_handler, &telemetry, error).is_err()
                    {
                        break;
                    }
                }
            }
        }

        let mut unacknowledged = 0usize;
        while ack_rx.try_recv().is_ok() {
            unacknowledged += 1;
        }
        if unacknowledged > 0 {
            tracing::info!(unacknowledged, "dropping acknowledgements queued after an abort");
        }
        tracing::debug!("ack dispatcher stopped");
    })
}
