use crate::{Engine, EngineConfig, ItemHooks};
use anyhow::{Context, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Coordinates the engine lifecycle and handles OS signals for shutdowns.
pub struct Runner<H: ItemHooks> {
    engine: Engine<H>,
    shutdown: CancellationToken,
    started: bool,
}

impl<H: ItemHooks> Runner<H> {
    /// Creates a new runner and wires a root [`CancellationToken`] that propagates
    /// through the entire pipeline (roles, ack dispatcher, metrics reporter).
    pub fn new(config: EngineConfig, hooks: H) -> Self {
        let shutdown = CancellationToken::new();
        let engine = Engine::with_cancellation_token(config, hooks, shutdown.clone());
        Self {
            engine,
            shutdown,
            started: false,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn engine(&self) -> &Engine<H> {
        &self.engine
    }

    /// Starts the underlying engine.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        if let Err(err) = self.engine.start().await {
            self.reinitialize_shutdown_token();
            return Err(err);
        }
        self.started = true;
        Ok(())
    }

    /// Stops the engine by cancelling the root token and delegating to [`Engine::stop`].
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        let result = self.engine.stop().await;
        self.started = false;
        self.reinitialize_shutdown_token();
        result
    }

    /// Runs until `trigger` completes or the shutdown token is cancelled elsewhere, for
    /// instance by a fatal hook error.
    pub async fn run_until<F>(&mut self, trigger: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.run_with(async {
            trigger.await;
            Ok("trigger")
        })
        .await
    }

    /// Runs until SIGHUP, SIGINT, SIGTERM or SIGQUIT is received (Ctrl-C on other platforms)
    /// or the shutdown token is cancelled elsewhere.
    pub async fn run_until_signal(&mut self) -> Result<()> {
        self.run_with(termination_signal()).await
    }

    /// Runs until a termination signal, then exits the process. Never returns.
    ///
    /// Exits with status 0 after a signal-triggered stop and 1 when the pipeline aborted.
    pub async fn wait_termination(mut self) {
        match self.run_until_signal().await {
            Ok(()) => {
                tracing::info!("runner stopped; exiting");
                std::process::exit(0)
            }
            Err(err) => {
                tracing::error!(error = ?err, "runner stopped with error; exiting");
                std::process::exit(1)
            }
        }
    }

    async fn run_with<F>(&mut self, trigger: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        self.start().await?;
        tracing::info!("runner started; waiting for a termination signal");

        let mut trigger_error = None;
        tokio::select! {
            outcome = trigger => match outcome {
                Ok(source) => {
                    tracing::info!(source, "termination requested; shutting down runner");
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to wait for termination; shutting down runner");
                    trigger_error = Some(err);
                }
            },
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        let stopped = self.stop().await;
        match trigger_error {
            Some(err) => Err(err),
            None => stopped,
        }
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.engine.replace_shutdown_root(self.shutdown.clone());
    }
}

#[cfg(unix)]
async fn termination_signal() -> Result<&'static str> {
    use futures::future::select_all;
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        (SignalKind::hangup(), "SIGHUP"),
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::quit(), "SIGQUIT"),
    ];

    let mut streams = Vec::with_capacity(kinds.len());
    for (kind, name) in kinds {
        let stream =
            signal(kind).with_context(|| format!("failed to install {name} handler"))?;
        streams.push((stream, name));
    }

    let waits = streams.iter_mut().map(|(stream, name)| {
        let name = *name;
        Box::pin(async move {
            stream.recv().await;
            name
        })
    });
    let (name, _, _) = select_all(waits).await;
    Ok(name)
}

#[cfg(not(unix))]
async fn termination_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    Ok("ctrl-c")
}
