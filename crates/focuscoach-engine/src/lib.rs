//! FocusCoach workflow engine.
//!
//! This crate provides a small runtime that executes a declared graph of
//! asynchronous steps.  Each step is triggered by one or more event
//! variants and produces events that are fed back into the run:
//!
//! - **[`event`]** -- The [`WorkflowEvent`] trait implemented by a closed
//!   event enum, and [`VariantSet`] for "or"-combined step inputs.
//! - **[`registry`]** -- Declarative step table with registration-time
//!   detection of ambiguous or empty routes.
//! - **[`context`]** -- Per-run [`HandlerContext`] exposing shared run data,
//!   `emit`, and the out-of-band `require_event` wait.
//! - **[`runner`]** -- The scheduler.  [`Workflow::run`] returns a
//!   [`WorkflowRun`] stream of every event the run produces.
//! - **[`error`]** -- Unified engine error types via [`thiserror`].
//!
//! All public types are `Send + Sync` and designed for use within a
//! multi-threaded tokio runtime.

pub mod context;
pub mod error;
pub mod event;
pub mod registry;
pub mod runner;

// Re-export the most commonly used types at the crate root for convenience.
pub use context::{EventWaiter, HandlerContext, RunHandle};
pub use error::{Result, StepError, WorkflowError};
pub use event::{VariantSet, WorkflowEvent};
pub use registry::{StepDefinition, StepRegistry};
pub use runner::{RunnerConfig, Workflow, WorkflowRun};
