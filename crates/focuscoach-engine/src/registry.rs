//! Step registry.
//!
//! The registry is the declarative table the runner dispatches against.
//! Every step names the variants that trigger it and the variants it may
//! emit.  Routing must be unambiguous: a variant is claimed by at most one
//! step, and this is enforced when the step is registered rather than when
//! an event arrives.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = StepRegistry::<MonitorEvent, FocusContext>::new();
//! registry.register(
//!     "capture",
//!     MonitorVariant::SleepComplete,
//!     MonitorVariant::ScreenshotTaken,
//!     |_ctx, _event| async move { Ok(MonitorEvent::ScreenshotTaken { path }) },
//! )?;
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::HandlerContext;
use crate::error::{Result, StepError, WorkflowError};
use crate::event::{VariantSet, WorkflowEvent};

/// Type-erased step handler stored by the registry.
pub(crate) type BoxedHandler<E, D> = Arc<
    dyn Fn(HandlerContext<E, D>, E) -> BoxFuture<'static, std::result::Result<E, StepError>>
        + Send
        + Sync,
>;

// ---------------------------------------------------------------------------
// Step definition
// ---------------------------------------------------------------------------

/// A registered unit of work.
pub struct StepDefinition<E: WorkflowEvent, D> {
    name: Arc<str>,
    inputs: VariantSet<E::Variant>,
    outputs: VariantSet<E::Variant>,
    pub(crate) handler: BoxedHandler<E, D>,
}

impl<E: WorkflowEvent, D> StepDefinition<E, D> {
    /// The step's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Variants that trigger this step.
    pub fn inputs(&self) -> &VariantSet<E::Variant> {
        &self.inputs
    }

    /// Variants this step is allowed to emit.
    pub fn outputs(&self) -> &VariantSet<E::Variant> {
        &self.outputs
    }
}

impl<E: WorkflowEvent, D> std::fmt::Debug for StepDefinition<E, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Table of steps keyed by the variants they accept.
pub struct StepRegistry<E: WorkflowEvent, D> {
    steps: Vec<Arc<StepDefinition<E, D>>>,
    routes: HashMap<E::Variant, usize>,
}

impl<E: WorkflowEvent, D: Send + 'static> StepRegistry<E, D> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Register a step.
    ///
    /// `inputs` may be a single variant or a disjunction built with
    /// [`VariantSet::or`].  Fails without modifying the registry if the step
    /// name is taken, either set is empty, the terminal variant is claimed,
    /// or any input variant is already claimed by another step.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        inputs: impl Into<VariantSet<E::Variant>>,
        outputs: impl Into<VariantSet<E::Variant>>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(HandlerContext<E, D>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<E, StepError>> + Send + 'static,
    {
        let name: String = name.into();
        let inputs = inputs.into();
        let outputs = outputs.into();

        if self.steps.iter().any(|s| s.name() == name) {
            return Err(WorkflowError::DuplicateStepName { step: name });
        }
        if inputs.is_empty() {
            return Err(WorkflowError::EmptyInputs { step: name });
        }
        if outputs.is_empty() {
            return Err(WorkflowError::EmptyOutputs { step: name });
        }
        if let Some(terminal) = E::TERMINAL
            && inputs.contains(terminal)
        {
            return Err(WorkflowError::TerminalInput {
                step: name,
                variant: terminal.to_string(),
            });
        }
        for variant in inputs.iter() {
            if let Some(&index) = self.routes.get(&variant) {
                return Err(WorkflowError::DuplicateInputClaim {
                    variant: variant.to_string(),
                    existing: self.steps[index].name().to_owned(),
                    step: name,
                });
            }
        }

        let index = self.steps.len();
        for variant in inputs.iter() {
            self.routes.insert(variant, index);
        }

        tracing::debug!(step = %name, inputs = %inputs, outputs = %outputs, "step registered");

        let handler: BoxedHandler<E, D> = Arc::new(move |ctx, event| handler(ctx, event).boxed());
        self.steps.push(Arc::new(StepDefinition {
            name: name.into(),
            inputs,
            outputs,
            handler,
        }));

        Ok(())
    }
}

impl<E: WorkflowEvent, D> StepRegistry<E, D> {
    /// Find the step that accepts `variant`.
    pub fn route(&self, variant: E::Variant) -> Option<&Arc<StepDefinition<E, D>>> {
        self.routes.get(&variant).map(|&index| &self.steps[index])
    }

    /// Look up a step by name.
    pub fn get(&self, name: &str) -> Option<&Arc<StepDefinition<E, D>>> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// All registered steps in registration order.
    pub fn steps(&self) -> impl Iterator<Item = &Arc<StepDefinition<E, D>>> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every variant declared as output by at least one step.
    pub fn declared_outputs(&self) -> HashSet<E::Variant> {
        self.steps
            .iter()
            .flat_map(|step| step.outputs().iter())
            .collect()
    }

    /// Check that every variant reachable from the start event, other than
    /// the terminal variant, is accepted by some step.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut frontier: VecDeque<(E::Variant, String)> = VecDeque::new();
        frontier.push_back((E::START, "<start>".to_owned()));

        while let Some((variant, emitter)) = frontier.pop_front() {
            if !seen.insert(variant) || E::TERMINAL == Some(variant) {
                continue;
            }
            let Some(step) = self.route(variant) else {
                return Err(WorkflowError::UnroutableVariant {
                    variant: variant.to_string(),
                    emitter,
                });
            };
            for output in step.outputs().iter() {
                frontier.push_back((output, step.name().to_owned()));
            }
        }

        Ok(())
    }
}

impl<E: WorkflowEvent, D: Send + 'static> Default for StepRegistry<E, D> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Relay {
        Start(u32),
        Forward(u32),
        Back(u32),
        Done,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) enum RelayVariant {
        Start,
        Forward,
        Back,
        Done,
    }

    impl fmt::Display for RelayVariant {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl WorkflowEvent for Relay {
        type Variant = RelayVariant;
        type StartPayload = u32;
        const START: RelayVariant = RelayVariant::Start;
        const TERMINAL: Option<RelayVariant> = Some(RelayVariant::Done);

        fn variant(&self) -> RelayVariant {
            match self {
                Relay::Start(_) => RelayVariant::Start,
                Relay::Forward(_) => RelayVariant::Forward,
                Relay::Back(_) => RelayVariant::Back,
                Relay::Done => RelayVariant::Done,
            }
        }

        fn start(payload: u32) -> Self {
            Relay::Start(payload)
        }
    }

    fn forward(
        _ctx: HandlerContext<Relay, ()>,
        _event: Relay,
    ) -> impl Future<Output = std::result::Result<Relay, StepError>> {
        async { Ok(Relay::Forward(1)) }
    }

    #[test]
    fn register_and_route() {
        let mut registry = StepRegistry::<Relay, ()>::new();
        registry
            .register(
                "forward",
                VariantSet::of(RelayVariant::Start).or(RelayVariant::Back),
                RelayVariant::Forward,
                forward,
            )
            .expect("register forward");

        assert_eq!(registry.len(), 1);
        let step = registry.route(RelayVariant::Back).expect("route");
        assert_eq!(step.name(), "forward");
        assert!(registry.route(RelayVariant::Forward).is_none());
        assert!(registry.get("forward").is_some());
    }

    #[test]
    fn duplicate_claim_is_rejected() {
        let mut registry = StepRegistry::<Relay, ()>::new();
        registry
            .register("a", RelayVariant::Start, RelayVariant::Forward, forward)
            .unwrap();

        let err = registry
            .register(
                "b",
                VariantSet::of(RelayVariant::Back).or(RelayVariant::Start),
                RelayVariant::Forward,
                forward,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::DuplicateInputClaim { ref existing, ref step, .. }
                if existing == "a" && step == "b"
        ));
        // The rejected step left no partial routes behind.
        assert!(registry.route(RelayVariant::Back).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_sets_and_duplicate_names_are_rejected() {
        let mut registry = StepRegistry::<Relay, ()>::new();
        let err = registry
            .register("a", VariantSet::empty(), RelayVariant::Forward, forward)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyInputs { .. }));

        let err = registry
            .register("a", RelayVariant::Start, VariantSet::empty(), forward)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyOutputs { .. }));

        registry
            .register("a", RelayVariant::Start, RelayVariant::Forward, forward)
            .unwrap();
        let err = registry
            .register("a", RelayVariant::Back, RelayVariant::Forward, forward)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateStepName { .. }));
    }

    #[test]
    fn terminal_variant_cannot_be_claimed() {
        let mut registry = StepRegistry::<Relay, ()>::new();
        let err = registry
            .register("end", RelayVariant::Done, RelayVariant::Forward, forward)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::TerminalInput { .. }));
    }

    #[test]
    fn validate_detects_unroutable_output() {
        let mut registry = StepRegistry::<Relay, ()>::new();
        registry
            .register("forward", RelayVariant::Start, RelayVariant::Forward, forward)
            .unwrap();

        let err = registry.validate().unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::UnroutableVariant { ref variant, ref emitter }
                if variant == "Forward" && emitter == "forward"
        ));
    }

    #[test]
    fn validate_accepts_closed_graph_with_terminal() {
        let mut registry = StepRegistry::<Relay, ()>::new();
        registry
            .register(
                "forward",
                VariantSet::of(RelayVariant::Start).or(RelayVariant::Back),
                RelayVariant::Forward,
                forward,
            )
            .unwrap();
        registry
            .register(
                "bounce",
                RelayVariant::Forward,
                [RelayVariant::Back, RelayVariant::Done],
                |_ctx, _event| async { Ok::<_, StepError>(Relay::Done) },
            )
            .unwrap();

        registry.validate().expect("graph is closed");
        assert_eq!(registry.declared_outputs().len(), 3);
    }

    #[test]
    fn validate_requires_start_route() {
        let registry = StepRegistry::<Relay, ()>::new();
        assert!(matches!(
            registry.validate(),
            Err(WorkflowError::UnroutableVariant { .. })
        ));
    }
}
