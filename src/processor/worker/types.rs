use std::fmt;
use std::num::NonZeroUsize;

/// Role a worker task is bound to for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    /// Calls `pulling` and pushes new items onto the store.
    Puller,
    /// Moves items from the store into the bridge.
    Filler,
    /// Drains the bridge through `handling`.
    Handler,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Puller => "puller",
            WorkerRole::Filler => "filler",
            WorkerRole::Handler => "handler",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many tasks of each role the engine spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleLayout {
    pullers: usize,
    fillers: usize,
    handlers: usize,
}

impl RoleLayout {
    pub const fn new(pullers: usize, fillers: usize, handlers: usize) -> Self {
        Self {
            pullers,
            fillers,
            handlers,
        }
    }

    /// Assigns roles by worker position: the first worker pulls, the second fills and every
    /// further worker handles.
    ///
    /// With one worker nothing is ever dispatched; with two the bridge fills up and is never
    /// drained.
    pub fn from_parallelism(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            pullers: 1,
            fillers: usize::from(workers >= 2),
            handlers: workers.saturating_sub(2),
        }
    }

    /// [`RoleLayout::from_parallelism`] applied to the parallelism reported by the host.
    pub fn from_available_parallelism() -> Self {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::from_parallelism(workers)
    }

    pub fn pullers(&self) -> usize {
        self.pullers
    }

    pub fn fillers(&self) -> usize {
        self.fillers
    }

    pub fn handlers(&self) -> usize {
        self.handlers
    }

    pub fn total(&self) -> usize {
        self.pullers + self.fillers + self.handlers
    }

    /// Roles in spawn order: pullers, then fillers, then handlers.
    pub fn roles(&self) -> impl Iterator<Item = WorkerRole> {
        std::iter::repeat(WorkerRole::Puller)
            .take(self.pullers)
            .chain(std::iter::repeat(WorkerRole::Filler).take(self.fillers))
            .chain(std::iter::repeat(WorkerRole::Handler).take(self.handlers))
    }
}

impl Default for RoleLayout {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

/// Result of a single filler or handler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StepOutcome {
    /// The step did its work.
    Progressed,
    /// Nothing to do this iteration.
    Idle,
    /// The run token fired while the step was waiting.
    Cancelled,
}
