//! The four monitor step handlers.
//!
//! Each handler is a method on [`MonitorSteps`], which owns the
//! collaborators.  Registration lives in [`crate::workflow`].

use std::sync::Arc;
use std::time::Duration;

use focuscoach_engine::{HandlerContext, StepError};
use tracing::{debug, info, warn};

use crate::context::FocusContext;
use crate::events::{MonitorEvent, MonitorVariant};
use crate::traits::{DistractionClassifier, Intervention, InterventionSurface, ScreenCapture};

pub(crate) type MonitorContext = HandlerContext<MonitorEvent, FocusContext>;
pub(crate) type StepResult = Result<MonitorEvent, StepError>;

/// Collaborators and timing shared by every step of a monitor workflow.
#[derive(Clone)]
pub(crate) struct MonitorSteps {
    pub(crate) capture: Arc<dyn ScreenCapture>,
    pub(crate) classifier: Arc<dyn DistractionClassifier>,
    pub(crate) surface: Arc<dyn InterventionSurface>,
    pub(crate) interval: Duration,
}

impl MonitorSteps {
    /// Wait out the check interval.  The first check, triggered by
    /// `Start`, runs immediately.
    pub(crate) async fn sleep(&self, ctx: MonitorContext, _event: MonitorEvent) -> StepResult {
        match ctx.trigger() {
            MonitorVariant::Start => debug!("first focus check runs immediately"),
            trigger => {
                debug!(%trigger, interval_ms = self.interval.as_millis() as u64, "sleeping before next focus check");
                tokio::time::sleep(self.interval).await;
            }
        }
        Ok(MonitorEvent::SleepComplete)
    }

    pub(crate) async fn capture(&self, _ctx: MonitorContext, _event: MonitorEvent) -> StepResult {
        let path = self.capture.capture().await?;
        debug!(path = %path.display(), "screen captured");
        Ok(MonitorEvent::ScreenshotTaken { path })
    }

    /// Judge the screenshot, then hand it back to the capture service for
    /// archiving or deletion.
    pub(crate) async fn classify(&self, ctx: MonitorContext, event: MonitorEvent) -> StepResult {
        let path = match event {
            MonitorEvent::ScreenshotTaken { path } => path,
            other => return Err(format!("classify cannot handle {other:?}").into()),
        };

        let (objective, stats) = {
            let data = ctx.data().lock().await;
            (data.objective.clone(), data.stats())
        };

        let verdict = self.classifier.classify(&objective, &path).await;

        if let Err(e) = self.capture.release(&path).await {
            warn!(path = %path.display(), error = %e, "failed to release screenshot");
        }

        let verdict = verdict?;
        stats.record_check();
        info!(
            distracted = verdict.is_distracted,
            productivity = verdict.productivity_score,
            relevance = verdict.goal_relevance,
            parsed = verdict.parsed,
            "focus checked"
        );

        if verdict.is_distracted {
            stats.record_violation(&verdict.description);
            Ok(MonitorEvent::FocusViolation {
                description: verdict.description,
            })
        } else {
            Ok(MonitorEvent::FocusVerified)
        }
    }

    /// Open the intervention surface and suspend until the user closes it.
    ///
    /// The wait is registered before the surface opens, so a surface that
    /// closes immediately still resolves it.
    pub(crate) async fn intervene(&self, ctx: MonitorContext, event: MonitorEvent) -> StepResult {
        let description = match event {
            MonitorEvent::FocusViolation { description } => description,
            other => return Err(format!("intervene cannot handle {other:?}").into()),
        };

        let (intervention, stats) = {
            let data = ctx.data().lock().await;
            let intervention = Intervention {
                message: data.intervention_message.clone(),
                description,
                objective: data.objective.clone(),
            };
            (intervention, data.stats())
        };
        stats.set_active_violation(Some(intervention.description.clone()));

        let acknowledged = ctx.wait_for(MonitorVariant::ViolationAcknowledged)?;

        let closer = ctx.clone();
        // Held across the wait; an aborted step drops it and closes the surface.
        let _surface = self
            .surface
            .open(
                intervention,
                Box::new(move || {
                    if let Err(e) = closer.emit(MonitorEvent::ViolationAcknowledged) {
                        debug!(error = %e, "intervention closed after run ended");
                    }
                }),
            )
            .await?;
        info!("intervention opened, waiting for acknowledgement");

        acknowledged.await?;
        info!("violation acknowledged");

        stats.set_active_violation(None);
        Ok(MonitorEvent::FocusVerified)
    }
}
