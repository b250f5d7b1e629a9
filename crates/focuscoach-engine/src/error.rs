//! Engine error types.
//!
//! Every engine API surfaces failures through [`WorkflowError`].  Variants
//! fall into three families: configuration errors (bad step table or a step
//! breaking its declared contract), step failures (a handler returned an
//! error), and wait/run lifecycle errors.

/// Error type returned by step handlers.
///
/// Handlers call into arbitrary collaborators, so the engine accepts any
/// boxed error and wraps it in [`WorkflowError::StepFailed`].
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    // -- Registration errors ------------------------------------------------
    /// A step was registered without any input variant.
    #[error("step `{step}` declares no input variants")]
    EmptyInputs { step: String },

    /// A step was registered without any output variant.
    #[error("step `{step}` declares no output variants")]
    EmptyOutputs { step: String },

    /// Two steps were registered under the same name.
    #[error("step `{step}` is already registered")]
    DuplicateStepName { step: String },

    /// Two steps claim the same input variant, so routing would be ambiguous.
    #[error("variant {variant} is claimed by both `{existing}` and `{step}`")]
    DuplicateInputClaim {
        variant: String,
        existing: String,
        step: String,
    },

    /// A step claims the terminal variant, which is never dispatched.
    #[error("step `{step}` claims terminal variant {variant} as input")]
    TerminalInput { step: String, variant: String },

    /// A variant reachable from the start event is claimed by no step.
    #[error("variant {variant} (emitted by `{emitter}`) is not accepted by any step")]
    UnroutableVariant { variant: String, emitter: String },

    // -- Dispatch-time configuration errors ---------------------------------
    /// An event reached the front of the queue and no step accepts it.
    #[error("no step accepts event variant {variant}")]
    UnroutableEvent { variant: String },

    /// A step emitted a variant missing from its declared output set.
    #[error("step `{step}` emitted undeclared variant {variant}")]
    UndeclaredOutput { step: String, variant: String },

    // -- Step failures ------------------------------------------------------
    /// A step handler returned an error; the run is terminated.
    #[error("step `{step}` failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    // -- Wait / lifecycle errors --------------------------------------------
    /// A wait is already outstanding for this variant in this run.
    #[error("a wait for {variant} is already registered in this run")]
    WaitAlreadyRegistered { variant: String },

    /// The run ended before the awaited variant was emitted.
    #[error("wait for {variant} was cancelled because the run ended")]
    WaitCancelled { variant: String },

    /// The run has ended and no longer accepts events.
    #[error("workflow run is closed")]
    RunClosed,
}

impl WorkflowError {
    /// Whether this error reports a misconfigured step table or a step that
    /// broke its declared contract, as opposed to a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyInputs { .. }
                | Self::EmptyOutputs { .. }
                | Self::DuplicateStepName { .. }
                | Self::DuplicateInputClaim { .. }
                | Self::TerminalInput { .. }
                | Self::UnroutableVariant { .. }
                | Self::UnroutableEvent { .. }
                | Self::UndeclaredOutput { .. }
        )
    }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_family() {
        let err = WorkflowError::UndeclaredOutput {
            step: "classify".into(),
            variant: "Start".into(),
        };
        assert!(err.is_configuration());
        assert!(!WorkflowError::RunClosed.is_configuration());
    }

    #[test]
    fn step_failure_keeps_source() {
        let source: StepError = "capture device missing".into();
        let err = WorkflowError::StepFailed {
            step: "capture".into(),
            source,
        };
        assert_eq!(
            err.to_string(),
            "step `capture` failed: capture device missing"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
