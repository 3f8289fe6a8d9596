use crate::queue::item::QueueItem;
use crate::queue::stack::ItemStore;
use anyhow::Error as AnyError;
use core::future::Future;
use core::pin::Pin;

/// Boxed future returned by the asynchronous hooks.
pub type HookFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AnyError>> + Send + 'a>>;

/// Enumerates the hooks whose failures are reported through [`ItemHooks::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Init,
    Pulling,
    Handling,
    PushBack,
    Ack,
}

/// What the engine does after [`ItemHooks::on_error`] has seen an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Keep every role running.
    Continue,
    /// Cancel the whole pipeline and surface the error from `stop`/`run_until_signal`.
    Abort,
}

/// Error raised by one of the caller-supplied hooks.
#[derive(Debug)]
pub struct HookError {
    stage: HookStage,
    key: Option<String>,
    source: AnyError,
}

impl HookError {
    pub fn new(stage: HookStage, source: AnyError) -> Self {
        Self {
            stage,
            key: None,
            source,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn stage(&self) -> HookStage {
        self.stage
    }

    /// Key of the item being processed when the hook failed, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn into_source(self) -> AnyError {
        self.source
    }
}

impl core::fmt::Display for HookError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{:?} hook error for item {key}: {}", self.stage, self.source),
            None => write!(f, "{:?} hook error: {}", self.stage, self.source),
        }
    }
}

// `Display` already carries the hook's error, so it is not repeated as a source.
impl std::error::Error for HookError {}

/// Hook set wired into the engine by the embedding application.
///
/// Only [`ItemHooks::pulling`] and [`ItemHooks::handling`] are required; every other hook has
/// the engine's default behaviour. All hooks except [`ItemHooks::on_ack`] run on the role that
/// triggered them and may suspend it.
pub trait ItemHooks: Send + Sync + 'static {
    type Item: QueueItem;

    /// Invoked once per start, before any role runs. Seeds the store.
    fn on_init(&self, _store: &mut ItemStore<Self::Item>) -> Result<(), AnyError> {
        Ok(())
    }

    /// Fetches zero or one new item from the external source.
    fn pulling(&self) -> HookFuture<'_, Option<Self::Item>>;

    /// Processes one item drawn from the bridge. An error marks the item as failed.
    fn handling<'a>(&'a self, item: &'a Self::Item) -> HookFuture<'a, ()>;

    /// Policy applied to a failed item. The default puts it back on top of the store.
    fn push_back(
        &self,
        store: &mut ItemStore<Self::Item>,
        item: Self::Item,
    ) -> Result<(), AnyError> {
        store.push(item);
        Ok(())
    }

    /// Observer invoked as an item moves from the store into the bridge.
    fn on_pulled(&self, _item: &Self::Item) {}

    /// Observer invoked after an item was handled successfully.
    ///
    /// Runs on the acknowledgement dispatcher, never on a handler role.
    fn on_ack(&self, _item: Self::Item) -> HookFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Reporter for every hook failure. The default treats each error as fatal.
    fn on_error(&self, error: &HookError) -> ErrorDisposition {
        tracing::error!(
            stage = ?error.stage(),
            key = error.key().unwrap_or_default(),
            error = %error,
            "hook failed; aborting pipeline"
        );
        ErrorDisposition::Abort
    }
}

/// Outcome of a hook that can be interrupted by shutdown signals.
pub(crate) enum HookDecision<T> {
    Finished(Result<T, AnyError>),
    Cancelled,
}
