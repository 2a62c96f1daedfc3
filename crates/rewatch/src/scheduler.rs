//! The build loop.
//!
//! [`watch`] spawns a single task that owns all watcher state: the phase
//! (`Idle`, `Building`, `Closed`), the pending-rebuild flag, the debounce
//! timer, the last artifact and the [`WatchedModuleSet`]. It reacts to three
//! inputs, one at a time:
//!
//! - control messages from the [`Watcher`] handle (close, manual rebuild)
//! - filesystem events, filtered through the module set
//! - completion of the in-flight build stage
//!
//! Produce and serialize stages run on their own tasks so the loop keeps
//! absorbing filesystem events while a build is in flight. Only one build is
//! ever in flight; a change that arrives meanwhile sets the pending flag and
//! the next build starts as soon as the current one ends.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use rewatch_config::{ConfigError, OutputTarget, WatchConfig};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Sleep;

use crate::backend::{FsEventReceiver, FsEventSender, NotifyBackend, WatchBackend};
use crate::engine::{Artifact, BundleEngine};
use crate::error::{BuildError, WatchError};
use crate::events::WatchEvent;
use crate::modules::WatchedModuleSet;
use crate::origin::failure_origin;
use crate::output::{self, FileMap, OutputModes};

/// Start watching with the default `notify` backend.
///
/// Must be called inside a tokio runtime. The first build starts once the
/// caller yields, and its events are buffered until read, so no event is
/// ever missed.
///
/// # Example
///
/// ```rust,ignore
/// let mut watcher = rewatch::watch(engine, config);
/// while let Some(event) = watcher.next_event().await {
///     println!("{event}");
/// }
/// ```
pub fn watch<E>(engine: E, config: WatchConfig) -> Watcher
where
    E: BundleEngine + 'static,
{
    let options = config.watch.clone();
    Watcher::with_backend(engine, config, move |events| {
        NotifyBackend::new(&options, events)
    })
}

#[derive(Debug)]
enum Control {
    Rebuild,
    Close,
}

/// Handle to a running build loop.
///
/// Events are read with [`next_event`](Self::next_event) or through the
/// [`Stream`] implementation. Dropping the handle closes the watcher.
#[derive(Debug)]
pub struct Watcher {
    events: mpsc::UnboundedReceiver<WatchEvent>,
    control: mpsc::UnboundedSender<Control>,
    task: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Start watching with a custom backend.
    ///
    /// `make_backend` receives the sender the backend must forward its
    /// filesystem events to. An invalid config is reported as a single
    /// `Error` event, after which the stream ends.
    pub fn with_backend<E, B, F>(engine: E, config: WatchConfig, make_backend: F) -> Self
    where
        E: BundleEngine + 'static,
        B: WatchBackend + 'static,
        F: FnOnce(FsEventSender) -> B,
    {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        let backend = make_backend(fs_tx.clone());

        let task = match BuildLoop::new(
            Arc::new(engine),
            config,
            Box::new(backend),
            Channels {
                events: event_tx.clone(),
                control: control_rx,
                fs_events: fs_rx,
                _fs_sender: fs_tx,
            },
        ) {
            Ok(build_loop) => Some(tokio::spawn(build_loop.run())),
            Err(error) => {
                tracing::warn!(%error, "invalid watch configuration");
                let _ = event_tx.send(WatchEvent::Error {
                    error: error.into(),
                });
                None
            }
        };

        Self {
            events,
            control,
            task,
        }
    }

    /// Wait for the next event. Returns `None` once the loop has stopped.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    /// Next buffered event, without waiting.
    pub fn try_next_event(&mut self) -> Option<WatchEvent> {
        self.events.try_recv().ok()
    }

    /// Request a build now, skipping the debounce window.
    ///
    /// If a build is in flight, another one runs right after it.
    pub fn rebuild(&self) {
        let _ = self.control.send(Control::Rebuild);
    }

    /// Stop watching. Idempotent and non-blocking.
    ///
    /// A build in flight finishes silently: no further events, no new
    /// watches. If it is still producing, its artifact is discarded and
    /// nothing is written. If it is already serializing, the output files
    /// it is writing may still land on disk.
    pub fn close(&self) {
        let _ = self.control.send(Control::Close);
    }

    /// Wait for the loop to stop. Call [`close`](Self::close) first.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(%error, "build loop ended abnormally");
            }
        }
    }
}

impl Stream for Watcher {
    type Item = WatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Building,
    Closed,
}

enum Stage {
    Producing(JoinHandle<Result<Arc<dyn Artifact>, BuildError>>),
    Serializing(JoinHandle<Result<FileMap, BuildError>>),
}

enum StageOutcome {
    Produced(Result<Result<Arc<dyn Artifact>, BuildError>, JoinError>),
    Serialized(Result<Result<FileMap, BuildError>, JoinError>),
}

struct Channels {
    events: mpsc::UnboundedSender<WatchEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    fs_events: FsEventReceiver,
    // Keeps `fs_events` open for the lifetime of the loop.
    _fs_sender: FsEventSender,
}

struct BuildLoop {
    engine: Arc<dyn BundleEngine>,
    config: Arc<WatchConfig>,
    targets: Arc<Vec<OutputTarget>>,
    cwd: PathBuf,
    modes: OutputModes,
    modules: WatchedModuleSet,
    phase: Phase,
    rebuild_pending: bool,
    debounce_delay: Duration,
    debounce: Option<Pin<Box<Sleep>>>,
    last_artifact: Option<Arc<dyn Artifact>>,
    builds_completed: u64,
    started_at: Option<Instant>,
    stage: Option<Stage>,
    channels: Channels,
}

impl BuildLoop {
    fn new(
        engine: Arc<dyn BundleEngine>,
        config: WatchConfig,
        backend: Box<dyn WatchBackend>,
        channels: Channels,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let targets = config.targets()?;
        let cwd = config.working_dir()?;
        let modules = WatchedModuleSet::from_config(backend, &config)?;

        Ok(Self {
            engine,
            modes: OutputModes {
                in_memory: config.watch.in_memory,
                write: config.watch.write,
            },
            debounce_delay: Duration::from_millis(config.watch.debounce_ms),
            config: Arc::new(config),
            targets: Arc::new(targets),
            cwd,
            modules,
            phase: Phase::Idle,
            rebuild_pending: false,
            debounce: None,
            last_artifact: None,
            builds_completed: 0,
            started_at: None,
            stage: None,
            channels,
        })
    }

    async fn run(mut self) {
        self.run_build();

        loop {
            if self.phase == Phase::Closed && self.stage.is_none() {
                break;
            }
            let open = self.phase != Phase::Closed;

            tokio::select! {
                message = self.channels.control.recv(), if open => match message {
                    Some(Control::Rebuild) => self.request_build(),
                    Some(Control::Close) | None => self.close(),
                },
                Some(event) = self.channels.fs_events.recv(), if open => {
                    if self.modules.handle_event(&event).await {
                        self.schedule_rebuild();
                    }
                }
                () = wait_debounce(&mut self.debounce) => {
                    self.debounce = None;
                    self.debounce_expired();
                }
                outcome = wait_stage(&mut self.stage) => {
                    self.stage = None;
                    match outcome {
                        StageOutcome::Produced(result) => self.produced(result).await,
                        StageOutcome::Serialized(result) => self.serialized(result),
                    }
                }
            }
        }

        tracing::debug!(builds = self.builds_completed, "build loop stopped");
    }

    fn run_build(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        self.phase = Phase::Building;
        self.rebuild_pending = false;
        self.started_at = Some(Instant::now());
        self.emit(WatchEvent::BuildStart);

        let engine = Arc::clone(&self.engine);
        let config = Arc::clone(&self.config);
        let cache = self.last_artifact.clone();
        self.stage = Some(Stage::Producing(tokio::spawn(async move {
            engine.produce(&config, cache).await
        })));
    }

    async fn produced(&mut self, result: Result<Result<Arc<dyn Artifact>, BuildError>, JoinError>) {
        if self.phase == Phase::Closed {
            tracing::debug!("watcher closed during build, discarding artifact");
            return;
        }

        match result {
            Ok(Ok(artifact)) => {
                self.last_artifact = Some(Arc::clone(&artifact));
                let records = artifact.modules();
                match self.modules.reconcile(&records).await {
                    Ok(report) => {
                        for error in report.failures {
                            self.emit(WatchEvent::WatcherError {
                                error: error.into(),
                            });
                        }
                        self.start_serialize(artifact);
                    }
                    Err(error) => self.fail(error.into()),
                }
            }
            Ok(Err(error)) => {
                self.watch_failure_origin(&error).await;
                self.fail(error.into());
            }
            Err(error) => {
                tracing::warn!(%error, "build task failed");
                self.emit(WatchEvent::WatcherError {
                    error: WatchError::Task(error.to_string()),
                });
                self.finish();
            }
        }
    }

    fn start_serialize(&mut self, artifact: Arc<dyn Artifact>) {
        let targets = Arc::clone(&self.targets);
        let modes = self.modes;
        self.stage = Some(Stage::Serializing(tokio::spawn(async move {
            output::serialize(artifact.as_ref(), &targets, modes).await
        })));
    }

    fn serialized(&mut self, result: Result<Result<FileMap, BuildError>, JoinError>) {
        match result {
            Ok(Ok(files)) => {
                let duration = self
                    .started_at
                    .map(|started| started.elapsed())
                    .unwrap_or_default();
                let initial = self.builds_completed == 0;
                self.builds_completed += 1;
                if self.phase != Phase::Closed {
                    tracing::info!(
                        duration_ms = duration.as_millis() as u64,
                        initial,
                        files = files.len(),
                        "build finished"
                    );
                }
                self.emit(WatchEvent::BuildEnd {
                    duration,
                    initial,
                    files,
                });
            }
            Ok(Err(error)) => self.emit(WatchEvent::Error {
                error: error.into(),
            }),
            Err(error) => {
                tracing::warn!(%error, "serialize task failed");
                self.emit(WatchEvent::WatcherError {
                    error: WatchError::Task(error.to_string()),
                });
            }
        }
        self.finish();
    }

    fn fail(&mut self, error: WatchError) {
        tracing::debug!(%error, "build failed");
        self.emit(WatchEvent::Error { error });
        self.finish();
    }

    async fn watch_failure_origin(&mut self, error: &BuildError) {
        let Some(origin) = failure_origin(error, &self.cwd) else {
            return;
        };
        if let Err(error) = self.modules.watch_origin(&origin).await {
            tracing::warn!(%error, "could not watch failed module");
            self.emit(WatchEvent::WatcherError {
                error: error.into(),
            });
        }
    }

    /// Leave `Building` and run the deferred rebuild, if any.
    fn finish(&mut self) {
        if self.phase == Phase::Building {
            self.phase = Phase::Idle;
        }
        if self.rebuild_pending && self.phase == Phase::Idle {
            tracing::debug!("running deferred rebuild");
            self.run_build();
        }
    }

    fn schedule_rebuild(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        tracing::debug!(
            delay_ms = self.debounce_delay.as_millis() as u64,
            "change detected, debouncing rebuild"
        );
        self.debounce = Some(Box::pin(tokio::time::sleep(self.debounce_delay)));
    }

    fn debounce_expired(&mut self) {
        match self.phase {
            Phase::Building => {
                tracing::debug!("build in flight, deferring rebuild");
                self.rebuild_pending = true;
            }
            Phase::Idle => self.run_build(),
            Phase::Closed => {}
        }
    }

    fn request_build(&mut self) {
        self.debounce = None;
        self.debounce_expired();
    }

    fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;
        self.rebuild_pending = false;
        self.debounce = None;
        self.modules.close();
        tracing::debug!(in_flight = self.stage.is_some(), "watcher closed");
    }

    fn emit(&self, event: WatchEvent) {
        if self.phase == Phase::Closed {
            return;
        }
        // The handle may already be gone.
        let _ = self.channels.events.send(event);
    }
}

async fn wait_debounce(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_stage(stage: &mut Option<Stage>) -> StageOutcome {
    match stage {
        Some(Stage::Producing(handle)) => StageOutcome::Produced(handle.await),
        Some(Stage::Serializing(handle)) => StageOutcome::Serialized(handle.await),
        None => std::future::pending().await,
    }
}
