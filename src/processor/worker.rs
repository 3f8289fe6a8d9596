//! Worker module split across focused submodules:
//! - `types`: role enum and role layout
//! - `shared`: state shared by every role task of a run
//! - `process`: worker struct, role dispatch and pacing
//! - `pull`, `fill`, `handle`: the three role loops
//! - `tests`: role loop tests

mod fill;
mod handle;
mod process;
mod pull;
mod shared;
mod types;


pub use process::Worker;
pub use shared::{WorkerShared, WorkerSharedParams};
pub use types::{RoleLayout, WorkerRole};
