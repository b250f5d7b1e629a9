//! FocusCoach focus monitor.
//!
//! Hosts the four-step monitor loop on the `focuscoach-engine` runner:
//!
//! - **sleep** waits out the check interval (skipped for the first check).
//! - **capture** takes a screenshot through a [`ScreenCapture`].
//! - **classify** asks a [`DistractionClassifier`] whether the screenshot
//!   shows the user working toward their goal.
//! - **intervene** opens an [`InterventionSurface`] and suspends until the
//!   user dismisses it.
//!
//! The collaborators are traits so that the hosting shell picks concrete
//! implementations: [`CommandCapture`] for screenshots, [`OpenAiClient`] for
//! classification and chat, and [`JsonGoalStore`] for the saved goal.

pub mod capture;
pub mod context;
pub mod error;
pub mod events;
pub mod goal;
pub mod llm;
mod steps;
pub mod traits;
pub mod verdict;
pub mod workflow;

pub use capture::CommandCapture;
pub use context::{FocusContext, RunStats, StatsSnapshot};
pub use error::{MonitorError, Result};
pub use events::{MonitorEvent, MonitorVariant};
pub use goal::{GoalRecord, JsonGoalStore};
pub use llm::{LlmConfig, OpenAiClient};
pub use traits::{
    ChatCompletion, ChatMessage, ChatRole, DistractionClassifier, GoalStore, Intervention,
    InterventionSurface, OnClose, ScreenCapture, SurfaceGuard,
};
pub use verdict::DistractionVerdict;
pub use workflow::{Collaborators, FocusMonitor, MonitorConfig, MonitorRun, build_workflow};
