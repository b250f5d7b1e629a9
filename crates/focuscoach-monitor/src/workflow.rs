//! Assembly of the monitor topology and the [`FocusMonitor`] front door.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use focuscoach_engine::{
    RunHandle, RunnerConfig, StepRegistry, VariantSet, Workflow, WorkflowError, WorkflowRun,
};
use futures::Stream;
use uuid::Uuid;

use crate::context::{FocusContext, RunStats};
use crate::error::Result;
use crate::events::{MonitorEvent, MonitorVariant};
use crate::steps::MonitorSteps;
use crate::traits::{DistractionClassifier, InterventionSurface, ScreenCapture};

/// Time between two focus checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Nudge shown when no message is configured.
pub const DEFAULT_INTERVENTION_MESSAGE: &str =
    "You drifted away from your goal. Take a breath, then get back to it.";

/// Tunables for a monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub intervention_message: String,
    pub runner: RunnerConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            intervention_message: DEFAULT_INTERVENTION_MESSAGE.to_owned(),
            runner: RunnerConfig::default(),
        }
    }
}

/// The external services a monitor depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn ScreenCapture>,
    pub classifier: Arc<dyn DistractionClassifier>,
    pub surface: Arc<dyn InterventionSurface>,
}

/// Register the sleep, capture, classify, and intervene steps.
pub fn build_workflow(
    collaborators: Collaborators,
    config: &MonitorConfig,
) -> Result<Workflow<MonitorEvent, FocusContext>> {
    use MonitorVariant::*;

    let steps = Arc::new(MonitorSteps {
        capture: collaborators.capture,
        classifier: collaborators.classifier,
        surface: collaborators.surface,
        interval: config.interval,
    });
    let mut registry = StepRegistry::<MonitorEvent, FocusContext>::new();

    let s = Arc::clone(&steps);
    registry.register(
        "sleep",
        VariantSet::of(Start).or(FocusVerified).or(ViolationAcknowledged),
        SleepComplete,
        move |ctx, event| {
            let s = Arc::clone(&s);
            async move { s.sleep(ctx, event).await }
        },
    )?;

    let s = Arc::clone(&steps);
    registry.register("capture", SleepComplete, ScreenshotTaken, move |ctx, event| {
        let s = Arc::clone(&s);
        async move { s.capture(ctx, event).await }
    })?;

    let s = Arc::clone(&steps);
    registry.register(
        "classify",
        ScreenshotTaken,
        [FocusVerified, FocusViolation],
        move |ctx, event| {
            let s = Arc::clone(&s);
            async move { s.classify(ctx, event).await }
        },
    )?;

    // `ViolationAcknowledged` is emitted from the surface's close callback
    // through this step's context, so it is a declared output.
    let s = steps;
    registry.register(
        "intervene",
        FocusViolation,
        [FocusVerified, ViolationAcknowledged],
        move |ctx, event| {
            let s = Arc::clone(&s);
            async move { s.intervene(ctx, event).await }
        },
    )?;

    Ok(Workflow::new("focus-monitor", registry, config.runner.clone())?)
}

/// A validated monitor workflow that can be started against a goal.
pub struct FocusMonitor {
    workflow: Workflow<MonitorEvent, FocusContext>,
    config: MonitorConfig,
}

impl FocusMonitor {
    pub fn new(collaborators: Collaborators, config: MonitorConfig) -> Result<Self> {
        let workflow = build_workflow(collaborators, &config)?;
        Ok(Self { workflow, config })
    }

    /// Start monitoring `objective`.  Runs until the returned stream is
    /// dropped or a step fails.
    pub fn start(&self, objective: impl Into<String>) -> MonitorRun {
        let context = FocusContext::new(objective, self.config.intervention_message.clone());
        let stats = context.stats();
        let run = self.workflow.run((), context);
        tracing::info!(run_id = %run.run_id(), "focus monitor started");
        MonitorRun { run, stats }
    }
}

/// A live monitor run: the engine's event stream plus the run's counters.
pub struct MonitorRun {
    run: WorkflowRun<MonitorEvent>,
    stats: Arc<RunStats>,
}

impl MonitorRun {
    pub fn run_id(&self) -> Uuid {
        self.run.run_id()
    }

    pub fn handle(&self) -> RunHandle<MonitorEvent> {
        self.run.handle()
    }

    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Stop monitoring.  Equivalent to dropping the run.
    pub fn cancel(self) {
        self.run.cancel();
    }
}

impl Stream for MonitorRun {
    type Item = std::result::Result<MonitorEvent, WorkflowError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.run).poll_next(cx)
    }
}
