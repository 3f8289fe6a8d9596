//! Processor orchestration covering the engine, role workers, acknowledgement
//! dispatch, lifecycle management, and worker pool coordination.

pub mod ack;
pub mod engine;
pub mod lifecycle;
pub mod worker;
pub mod worker_pool;
