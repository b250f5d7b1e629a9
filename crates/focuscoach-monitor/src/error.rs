//! Monitor error types.
//!
//! Collaborator failures surface through [`MonitorError`].  Inside a
//! workflow step they are boxed into the engine's `StepError` and end the
//! run as `WorkflowError::StepFailed`.

use focuscoach_engine::WorkflowError;

/// Unified error type for the focus monitor and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    // -- Collaborators -------------------------------------------------------
    /// The screen could not be captured.
    #[error("screen capture failed: {reason}")]
    Capture { reason: String },

    /// The distraction classifier call failed.
    #[error("classifier request failed: {reason}")]
    Classifier { reason: String },

    /// The chat-completion call failed.
    #[error("chat completion failed: {reason}")]
    Chat { reason: String },

    /// No API key was configured for the completion endpoint.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// Reading or writing the saved goal failed.
    #[error("goal store error: {reason}")]
    GoalStore { reason: String },

    /// The intervention surface could not be opened.
    #[error("intervention surface error: {reason}")]
    Intervention { reason: String },

    // -- Engine --------------------------------------------------------------
    /// The monitor topology was rejected by the workflow engine.
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    // -- Upstream crate errors -----------------------------------------------
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience alias used throughout the monitor crate.
pub type Result<T> = std::result::Result<T, MonitorError>;
