pub mod processor;
pub mod queue;
pub mod runtime;

pub use processor::ack::{ack_channel, AckReceiver, AckSender};
pub use processor::engine::Engine;
pub use processor::worker::{RoleLayout, Worker, WorkerRole};
pub use queue::bridge::Bridge;
pub use queue::item::QueueItem;
pub use queue::stack::{ItemStore, SharedStore};
pub use runtime::config::{DrainPolicy, EngineConfig, EngineConfigBuilder, EngineConfigParams};
pub use runtime::hooks::{ErrorDisposition, HookError, HookFuture, HookStage, ItemHooks};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
