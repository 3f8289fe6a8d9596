use crate::processor::ack::AckSender;
use crate::queue::bridge::Bridge;
use crate::queue::stack::SharedStore;
use crate::runtime::config::DrainPolicy;
use crate::runtime::hooks::ItemHooks;
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Duration;

/// State every role task of one run holds a handle to.
pub struct WorkerShared<H: ItemHooks> {
    pub(super) hooks: Arc<H>,
    pub(super) store: SharedStore<H::Item>,
    pub(super) bridge: Arc<Bridge<H::Item>>,
    pub(super) telemetry: Arc<Telemetry>,
    pub(super) handling_permits: Arc<Semaphore>,
    pub(super) ack_tx: AckSender<H::Item>,
    pub(super) throttle: Duration,
    pub(super) drain_policy: DrainPolicy,
}

pub struct WorkerSharedParams<H: ItemHooks> {
    pub hooks: Arc<H>,
    pub store: SharedStore<H::Item>,
    pub bridge: Arc<Bridge<H::Item>>,
    pub telemetry: Arc<Telemetry>,
    pub handling_permits: Arc<Semaphore>,
    pub ack_tx: AckSender<H::Item>,
    pub throttle: Duration,
    pub drain_policy: DrainPolicy,
}

impl<H: ItemHooks> WorkerShared<H> {
    pub fn new(params: WorkerSharedParams<H>) -> Self {
        Self {
            hooks: params.hooks,
            store: params.store,
            bridge: params.bridge,
            telemetry: params.telemetry,
            handling_permits: params.handling_permits,
            ack_tx: params.ack_tx,
            throttle: params.throttle,
            drain_policy: params.drain_policy,
        }
    }
}

impl<H: ItemHooks> Clone for WorkerShared<H> {
    fn clone(&self) -> Self {
        Self {
            hooks: Arc::clone(&self.hooks),
            store: self.store.clone(),
            bridge: Arc::clone(&self.bridge),
            telemetry: Arc::clone(&self.telemetry),
            handling_permits: Arc::clone(&self.handling_permits),
            ack_tx: self.ack_tx.clone(),
            throttle: self.throttle,
            drain_policy: self.drain_policy,
        }
    }
}
