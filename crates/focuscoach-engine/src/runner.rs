//! Workflow runner.
//!
//! [`Workflow::run`] seeds a pending queue with the synthetic start event
//! and spawns a scheduler task onto the ambient tokio runtime.  The
//! scheduler pops events oldest-first, yields each one to the caller's
//! [`WorkflowRun`] stream, and spawns the single step that accepts it.
//! Whatever the step returns or emits is validated against its declared
//! outputs and pushed back onto the queue.
//!
//! # Lifecycle
//!
//! ```text
//! run()  -->  Running  -->  terminal event yielded      --> Closed
//!                      \->  failure yielded             --> Closed
//!                      \->  WorkflowRun dropped         --> Closed
//! ```
//!
//! Closing a run aborts every in-flight step task, releases outstanding
//! waits, and makes later emits fail with [`WorkflowError::RunClosed`].

use std::collections::HashMap;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;
use uuid::Uuid;

use crate::context::{HandlerContext, Pending, RunHandle, RunState};
use crate::error::{Result, WorkflowError};
use crate::event::WorkflowEvent;
use crate::registry::{StepDefinition, StepRegistry};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for a workflow's runs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How many produced events may sit unread before the scheduler waits
    /// for the consumer.
    pub channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A validated step graph that can be started any number of times.
///
/// Each [`Workflow::run`] gets its own run context, pending queue, and wait
/// table; nothing is shared between runs.
pub struct Workflow<E: WorkflowEvent, D> {
    name: Arc<str>,
    registry: Arc<StepRegistry<E, D>>,
    accepted: Arc<HashSet<E::Variant>>,
    config: RunnerConfig,
}

impl<E: WorkflowEvent, D: Send + 'static> Workflow<E, D> {
    /// Build a workflow from a populated registry.
    ///
    /// Fails if an event reachable from the start variant would have no
    /// step to route to.
    pub fn new(
        name: impl Into<String>,
        registry: StepRegistry<E, D>,
        config: RunnerConfig,
    ) -> Result<Self> {
        let name: String = name.into();
        registry.validate()?;

        tracing::info!(workflow = %name, steps = registry.len(), "workflow built");

        Ok(Self {
            name: name.into(),
            accepted: Arc::new(registry.declared_outputs()),
            registry: Arc::new(registry),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &StepRegistry<E, D> {
        &self.registry
    }

    /// Start a run.
    ///
    /// Must be called from within a tokio runtime.  The run makes progress
    /// on its own; the returned stream only observes it.  Dropping the
    /// stream cancels the run.
    pub fn run(&self, payload: E::StartPayload, data: D) -> WorkflowRun<E> {
        let run_id = Uuid::now_v7();
        let state = Arc::new(RunState::new(run_id));
        let capacity = self.config.channel_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        let scheduler = Scheduler {
            state: Arc::clone(&state),
            data: Arc::new(Mutex::new(data)),
            registry: Arc::clone(&self.registry),
            tx,
            tasks: JoinSet::new(),
            task_steps: HashMap::new(),
        };

        let span = tracing::info_span!("workflow", workflow = %self.name, %run_id);
        let driver = tokio::spawn(scheduler.drive(E::start(payload)).instrument(span));

        tracing::info!(workflow = %self.name, %run_id, "workflow run started");

        WorkflowRun {
            run_id,
            rx,
            driver,
            handle: RunHandle::new(state, Arc::clone(&self.accepted)),
        }
    }
}

// ---------------------------------------------------------------------------
// Run stream
// ---------------------------------------------------------------------------

/// The caller's view of a live run: a stream of every event it produces.
///
/// Yields `Ok(event)` for each dispatched event except the seeded start
/// event.  A terminal event is yielded and then the stream ends.  A failure
/// is yielded once as `Err` and then the stream ends.
pub struct WorkflowRun<E: WorkflowEvent> {
    run_id: Uuid,
    rx: mpsc::Receiver<Result<E>>,
    driver: JoinHandle<()>,
    handle: RunHandle<E>,
}

impl<E: WorkflowEvent> WorkflowRun<E> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// A handle that outlives borrowing the stream.
    pub fn handle(&self) -> RunHandle<E> {
        self.handle.clone()
    }

    /// Stop the run.  Equivalent to dropping the stream.
    pub fn cancel(self) {
        drop(self);
    }
}

impl<E: WorkflowEvent> Unpin for WorkflowRun<E> {}

impl<E: WorkflowEvent> Stream for WorkflowRun<E> {
    type Item = Result<E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<E: WorkflowEvent> Drop for WorkflowRun<E> {
    fn drop(&mut self) {
        if !self.handle.is_closed() {
            tracing::info!(run_id = %self.run_id, "workflow run cancelled by consumer");
        }
        self.handle.state().close();
        self.driver.abort();
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the dispatch loop and every in-flight step task of one run.
///
/// Dropping it (normal exit or abort) drops the [`JoinSet`], which aborts
/// all step tasks.
struct Scheduler<E: WorkflowEvent, D> {
    state: Arc<RunState<E>>,
    data: Arc<Mutex<D>>,
    registry: Arc<StepRegistry<E, D>>,
    tx: mpsc::Sender<Result<E>>,
    tasks: JoinSet<()>,
    task_steps: HashMap<tokio::task::Id, Arc<str>>,
}

/// Closes the run state when the scheduler future ends for any reason.
struct CloseGuard<E: WorkflowEvent>(Arc<RunState<E>>);

impl<E: WorkflowEvent> Drop for CloseGuard<E> {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl<E: WorkflowEvent, D: Send + 'static> Scheduler<E, D> {
    async fn drive(mut self, start: E) {
        let _guard = CloseGuard(Arc::clone(&self.state));

        // The start event is dispatched but never yielded.
        if let Err(err) = self.dispatch(start) {
            self.finish_with(err).await;
            return;
        }

        loop {
            while let Some(pending) = self.state.queue.pop() {
                match pending {
                    Pending::Failed(err) => {
                        self.finish_with(err).await;
                        return;
                    }
                    Pending::Event(event) => {
                        let terminal = event.is_terminal();
                        if self.tx.send(Ok(event.clone())).await.is_err() {
                            tracing::debug!("consumer dropped the run stream");
                            return;
                        }
                        if terminal {
                            tracing::info!(variant = %event.variant(), "terminal event reached");
                            return;
                        }
                        if let Err(err) = self.dispatch(event) {
                            self.finish_with(err).await;
                            return;
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.state.notify.notified() => {}
                _ = self.tx.closed() => {
                    tracing::debug!("consumer dropped the run stream");
                    return;
                }
                Some(joined) = self.tasks.join_next_with_id() => {
                    self.reap(joined);
                }
            }
        }
    }

    /// Route `event` to its step and spawn the handler.
    fn dispatch(&mut self, event: E) -> Result<()> {
        let variant = event.variant();
        let step = self
            .registry
            .route(variant)
            .cloned()
            .ok_or_else(|| WorkflowError::UnroutableEvent {
                variant: variant.to_string(),
            })?;

        tracing::debug!(step = %step.name(), %variant, "dispatching event");
        self.spawn_step(step, event);
        Ok(())
    }

    fn spawn_step(&mut self, step: Arc<StepDefinition<E, D>>, event: E) {
        let trigger = event.variant();
        let ctx = HandlerContext::new(
            Arc::clone(&self.state),
            Arc::clone(&self.data),
            Arc::clone(&step),
            trigger,
        );
        let name = step.name_arc();
        let future = (step.handler)(ctx.clone(), event);

        let span = tracing::debug_span!("step", step = %name, %trigger);
        let step_name = Arc::clone(&name);
        let handle = self.tasks.spawn(
            async move {
                match future.await {
                    Ok(output) => {
                        tracing::debug!(variant = %output.variant(), "step completed");
                        // Undeclared outputs are already recorded as a run
                        // failure, and a closed run discards the output.
                        let _ = ctx.emit(output);
                    }
                    Err(source) => {
                        tracing::error!(error = %source, "step failed");
                        ctx.fail(WorkflowError::StepFailed {
                            step: step_name.to_string(),
                            source,
                        });
                    }
                }
            }
            .instrument(span),
        );
        self.task_steps.insert(handle.id(), name);
    }

    /// Account for a finished step task.  A panicking handler fails the run.
    fn reap(&mut self, joined: std::result::Result<(tokio::task::Id, ()), tokio::task::JoinError>) {
        match joined {
            Ok((id, ())) => {
                self.task_steps.remove(&id);
            }
            Err(err) => {
                let step = self
                    .task_steps
                    .remove(&err.id())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "<unknown>".to_owned());
                if err.is_panic() {
                    tracing::error!(%step, "step panicked");
                    self.state.fail(WorkflowError::StepFailed {
                        step,
                        source: "step handler panicked".into(),
                    });
                }
            }
        }
    }

    async fn finish_with(&mut self, err: WorkflowError) {
        tracing::error!(error = %err, configuration = err.is_configuration(), "workflow run failed");
        self.state.close();
        let _ = self.tx.send(Err(err)).await;
    }
}
