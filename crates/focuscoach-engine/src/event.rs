//! Workflow events and variant sets.
//!
//! An event type is a closed enum whose discriminant is mirrored by a
//! fieldless `Variant` tag.  The engine never inspects payloads: it routes
//! by [`WorkflowEvent::variant`] alone, so adding a payload field never
//! changes dispatch.
//!
//! ```rust
//! use focuscoach_engine::{VariantSet, WorkflowEvent};
//!
//! #[derive(Debug, Clone)]
//! enum Ping {
//!     Start,
//!     Pong(u32),
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum PingVariant {
//!     Start,
//!     Pong,
//! }
//!
//! impl std::fmt::Display for PingVariant {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl WorkflowEvent for Ping {
//!     type Variant = PingVariant;
//!     type StartPayload = ();
//!     const START: PingVariant = PingVariant::Start;
//!
//!     fn variant(&self) -> PingVariant {
//!         match self {
//!             Ping::Start => PingVariant::Start,
//!             Ping::Pong(_) => PingVariant::Pong,
//!         }
//!     }
//!
//!     fn start(_: ()) -> Self {
//!         Ping::Start
//!     }
//! }
//!
//! let inputs = VariantSet::of(PingVariant::Start).or(PingVariant::Pong);
//! assert!(inputs.contains(PingVariant::Pong));
//! ```

use std::fmt;
use std::hash::Hash;

// ---------------------------------------------------------------------------
// Event trait
// ---------------------------------------------------------------------------

/// An immutable, typed occurrence flowing through a workflow run.
pub trait WorkflowEvent: Clone + fmt::Debug + Send + Sync + 'static {
    /// Discriminant tag used for routing.
    type Variant: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Payload carried by the synthetic start event.
    type StartPayload: Send + 'static;

    /// The variant of the synthetic start event seeded into every run.
    const START: Self::Variant;

    /// A variant whose emission ends the run.  `None` means the run only
    /// ends when its consumer stops or a failure occurs.
    const TERMINAL: Option<Self::Variant> = None;

    /// The variant tag of this event.
    fn variant(&self) -> Self::Variant;

    /// Build the start event from the caller's initial payload.
    fn start(payload: Self::StartPayload) -> Self;

    /// Whether this event is the designated terminal event.
    fn is_terminal(&self) -> bool {
        Self::TERMINAL == Some(self.variant())
    }
}

// ---------------------------------------------------------------------------
// Variant sets
// ---------------------------------------------------------------------------

/// An ordered, duplicate-free disjunction of event variants.
///
/// Step inputs use it to express "triggered by any of these", step outputs
/// to declare every variant a handler may emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSet<V> {
    variants: Vec<V>,
}

impl<V: Copy + Eq> VariantSet<V> {
    /// A set holding a single variant.
    pub fn of(variant: V) -> Self {
        Self {
            variants: vec![variant],
        }
    }

    /// An empty set.  Registries reject steps with empty inputs or outputs.
    pub fn empty() -> Self {
        Self {
            variants: Vec::new(),
        }
    }

    /// Add `variant` to the disjunction.  Adding a variant twice is a no-op.
    #[must_use]
    pub fn or(mut self, variant: V) -> Self {
        if !self.variants.contains(&variant) {
            self.variants.push(variant);
        }
        self
    }

    /// Whether `variant` is a member of this set.
    pub fn contains(&self, variant: V) -> bool {
        self.variants.contains(&variant)
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Iterate the variants in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = V> + '_ {
        self.variants.iter().copied()
    }
}

impl<V: Copy + Eq> From<V> for VariantSet<V> {
    fn from(variant: V) -> Self {
        Self::of(variant)
    }
}

impl<V: Copy + Eq, const N: usize> From<[V; N]> for VariantSet<V> {
    fn from(variants: [V; N]) -> Self {
        variants
            .into_iter()
            .fold(Self::empty(), |set, variant| set.or(variant))
    }
}

impl<V: fmt::Display> fmt::Display for VariantSet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, variant) in self.variants.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{variant}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
