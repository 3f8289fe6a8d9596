use crate::runtime::hooks::{ErrorDisposition, HookError, ItemHooks};
use crate::runtime::telemetry::Telemetry;
use anyhow::Error as AnyError;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Records the first error that aborts a run and cancels the run and root tokens.
///
/// Later errors are returned to their callers but never replace the recorded one.
#[derive(Clone)]
pub struct FatalErrorHandler {
    inner: Arc<FatalState>,
}

struct FatalState {
    first_error: OnceLock<SharedFatalError>,
    root_shutdown: CancellationToken,
    run_shutdown: CancellationToken,
}

/// Cheaply cloneable view of the recorded error, convertible back into [`anyhow::Error`].
#[derive(Clone)]
struct SharedFatalError(Arc<AnyError>);

impl fmt::Debug for SharedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}

impl fmt::Display for SharedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0.as_ref(), f)
    }
}

impl std::error::Error for SharedFatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl FatalErrorHandler {
    pub fn new(root_shutdown: CancellationToken, run_shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(FatalState {
                first_error: OnceLock::new(),
                root_shutdown,
                run_shutdown,
            }),
        }
    }

    /// Escalates a hook failure.
    pub fn trigger(&self, error: HookError) -> AnyError {
        if self.is_triggered() {
            return error.into();
        }

        tracing::error!(
            stage = ?error.stage(),
            key = error.key().unwrap_or_default(),
            error = %error,
            "fatal hook error; initiating shutdown"
        );
        self.record(error.into())
    }

    /// Escalates a failure raised outside the hooks, such as a panicking role task.
    pub fn trigger_external(&self, context: &str, error: AnyError) -> AnyError {
        if self.is_triggered() {
            return error;
        }

        tracing::error!(context, error = %error, "fatal pipeline error; initiating shutdown");
        self.record(error)
    }

    fn record(&self, error: AnyError) -> AnyError {
        let shared = SharedFatalError(Arc::new(error));
        // A concurrent trigger may have won the slot; its error stays the recorded one.
        let _ = self.inner.first_error.set(shared.clone());

        self.inner.run_shutdown.cancel();
        self.inner.root_shutdown.cancel();

        shared.into()
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.first_error.get().is_some()
    }

    /// The first recorded fatal error, if any.
    pub fn error(&self) -> Option<AnyError> {
        self.inner
            .first_error
            .get()
            .map(|error| AnyError::new(error.clone()))
    }
}

/// Routes a hook failure through [`ItemHooks::on_error`].
///
/// Returns the escalated error when the hooks ask to abort; the fatal handler has already
/// cancelled the run by then.
pub(crate) fn report_hook_error<H: ItemHooks>(
    hooks: &H,
    fatal_handler: &FatalErrorHandler,
    telemetry: &Telemetry,
    error: HookError,
) -> Result<(), AnyError> {
    telemetry.record_hook_error();
    match hooks.on_error(&error) {
        ErrorDisposition::Continue => Ok(()),
        ErrorDisposition::Abort => Err(fatal_handler.trigger(error)),
    }
}
