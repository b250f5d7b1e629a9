//! Handler context and out-of-band event waits.
//!
//! Each step invocation receives a [`HandlerContext`].  It is cheap to clone
//! and `'static`, so a handler can move a copy into a callback that fires
//! long after the handler itself has suspended (a UI close handler, for
//! example) and emit from there.
//!
//! # Waits
//!
//! [`HandlerContext::wait_for`] registers a one-shot wait for a variant and
//! returns an [`EventWaiter`] future.  Registration is synchronous, so a
//! handler can register, hand an emitting callback to some external
//! collaborator, and only then await: an emit that races ahead of the await
//! is still delivered.  The first event of the variant emitted anywhere in
//! the run resolves the waiter and is consumed by it; the runner neither
//! dispatches nor yields that event.
//!
//! At most one wait per variant may be outstanding in a run.  A waiter that
//! is dropped unregisters itself, and every waiter is released with
//! [`WorkflowError::WaitCancelled`] when the run ends.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, Notify, oneshot};
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::event::WorkflowEvent;
use crate::registry::StepDefinition;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// An entry on the pending queue.
pub(crate) enum Pending<E> {
    /// An event awaiting dispatch.
    Event(E),
    /// A run-terminating failure raised by a step.
    Failed(WorkflowError),
}

/// An outstanding wait registration.
struct Waiter<E> {
    id: u64,
    tx: oneshot::Sender<E>,
}

/// State shared by the runner, every handler context, and run handles.
pub(crate) struct RunState<E: WorkflowEvent> {
    pub(crate) run_id: Uuid,
    /// FIFO of not-yet-dispatched events.
    pub(crate) queue: SegQueue<Pending<E>>,
    /// Wakes the runner when the queue gains an entry.
    pub(crate) notify: Notify,
    waiters: DashMap<E::Variant, Waiter<E>>,
    next_wait_id: AtomicU64,
    closed: AtomicBool,
}

impl<E: WorkflowEvent> RunState<E> {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            queue: SegQueue::new(),
            notify: Notify::new(),
            waiters: DashMap::new(),
            next_wait_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hand `event` to a registered waiter, or enqueue it for dispatch.
    pub(crate) fn deliver(&self, event: E) -> Result<()> {
        if self.is_closed() {
            return Err(WorkflowError::RunClosed);
        }

        let variant = event.variant();
        let event = match self.waiters.remove(&variant) {
            Some((_, waiter)) => match waiter.tx.send(event) {
                Ok(()) => {
                    tracing::debug!(run_id = %self.run_id, %variant, "event delivered to waiter");
                    return Ok(());
                }
                // The waiter was dropped between registration and delivery.
                Err(event) => event,
            },
            None => event,
        };

        tracing::trace!(run_id = %self.run_id, %variant, "event enqueued");
        self.queue.push(Pending::Event(event));
        self.notify.notify_one();
        Ok(())
    }

    /// Record a run-terminating failure.
    pub(crate) fn fail(&self, err: WorkflowError) {
        if self.is_closed() {
            tracing::debug!(run_id = %self.run_id, error = %err, "failure after run closed ignored");
            return;
        }
        self.queue.push(Pending::Failed(err));
        self.notify.notify_one();
    }

    fn register_wait(self: &Arc<Self>, variant: E::Variant) -> Result<EventWaiter<E>> {
        if self.is_closed() {
            return Err(WorkflowError::RunClosed);
        }

        let id = self.next_wait_id.fetch_add(1, Ordering::Relaxed);
        let rx = match self.waiters.entry(variant) {
            Entry::Occupied(_) => {
                return Err(WorkflowError::WaitAlreadyRegistered {
                    variant: variant.to_string(),
                });
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(Waiter { id, tx });
                rx
            }
        };

        // `close` may have drained the table between the check and insert.
        if self.is_closed() {
            self.waiters.remove_if(&variant, |_, w| w.id == id);
            return Err(WorkflowError::RunClosed);
        }

        tracing::debug!(run_id = %self.run_id, %variant, wait_id = id, "wait registered");

        Ok(EventWaiter {
            rx,
            variant,
            id,
            state: Arc::downgrade(self),
        })
    }

    pub(crate) fn pending_waits(&self) -> usize {
        self.waiters.len()
    }

    /// Mark the run closed and release every outstanding waiter.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = self.waiters.len();
        self.waiters.clear();
        tracing::debug!(run_id = %self.run_id, released, "run closed");
    }
}

// ---------------------------------------------------------------------------
// Event waiter
// ---------------------------------------------------------------------------

/// Future returned by [`HandlerContext::wait_for`].
///
/// Resolves with the first event of the awaited variant emitted after
/// registration, or with [`WorkflowError::WaitCancelled`] if the run ends
/// first.
#[must_use = "a wait does nothing unless awaited"]
pub struct EventWaiter<E: WorkflowEvent> {
    rx: oneshot::Receiver<E>,
    variant: E::Variant,
    id: u64,
    state: Weak<RunState<E>>,
}

impl<E: WorkflowEvent> EventWaiter<E> {
    /// The variant this waiter resolves on.
    pub fn variant(&self) -> E::Variant {
        self.variant
    }
}

// No field is structurally pinned.
impl<E: WorkflowEvent> Unpin for EventWaiter<E> {}

impl<E: WorkflowEvent> Future for EventWaiter<E> {
    type Output = Result<E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let variant = self.variant;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(event)) => Poll::Ready(Ok(event)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkflowError::WaitCancelled {
                variant: variant.to_string(),
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E: WorkflowEvent> Drop for EventWaiter<E> {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade()
            && state
                .waiters
                .remove_if(&self.variant, |_, w| w.id == self.id)
                .is_some()
        {
            tracing::debug!(run_id = %state.run_id, variant = %self.variant, "wait abandoned");
        }
    }
}

impl<E: WorkflowEvent> std::fmt::Debug for EventWaiter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWaiter")
            .field("variant", &self.variant)
            .field("id", &self.id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handler context
// ---------------------------------------------------------------------------

/// Per-invocation view of a workflow run handed to step handlers.
pub struct HandlerContext<E: WorkflowEvent, D> {
    state: Arc<RunState<E>>,
    data: Arc<Mutex<D>>,
    step: Arc<StepDefinition<E, D>>,
    trigger: E::Variant,
}

impl<E: WorkflowEvent, D> Clone for HandlerContext<E, D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            data: Arc::clone(&self.data),
            step: Arc::clone(&self.step),
            trigger: self.trigger,
        }
    }
}

impl<E: WorkflowEvent, D> HandlerContext<E, D> {
    pub(crate) fn new(
        state: Arc<RunState<E>>,
        data: Arc<Mutex<D>>,
        step: Arc<StepDefinition<E, D>>,
        trigger: E::Variant,
    ) -> Self {
        Self {
            state,
            data,
            step,
            trigger,
        }
    }

    /// Run-scoped data shared by every step of this run.
    pub fn data(&self) -> &Mutex<D> {
        &self.data
    }

    /// Identifier of the run this invocation belongs to.
    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    /// Name of the step being executed.
    pub fn step(&self) -> &str {
        self.step.name()
    }

    /// The variant that triggered this invocation.
    ///
    /// Steps accepting a disjunction of variants branch on this.
    pub fn trigger(&self) -> E::Variant {
        self.trigger
    }

    /// Emit `event` as if the handler had returned it.
    ///
    /// The variant must be in the step's declared outputs.  An undeclared
    /// variant is a configuration error: it is reported here and also
    /// terminates the run.  After the run has ended this returns
    /// [`WorkflowError::RunClosed`].
    pub fn emit(&self, event: E) -> Result<()> {
        let variant = event.variant();
        if !self.step.outputs().contains(variant) {
            tracing::error!(
                run_id = %self.state.run_id,
                step = %self.step.name(),
                %variant,
                "step emitted undeclared variant"
            );
            self.state.fail(self.undeclared(variant));
            return Err(self.undeclared(variant));
        }
        self.state.deliver(event)
    }

    /// Register a wait for the next event of `variant`.
    ///
    /// The wait is live as soon as this returns; await the returned
    /// [`EventWaiter`] to suspend until it resolves.
    pub fn wait_for(&self, variant: E::Variant) -> Result<EventWaiter<E>> {
        self.state.register_wait(variant)
    }

    /// Suspend the calling step until an event of `variant` is emitted
    /// anywhere in the run, then return it.
    pub async fn require_event(&self, variant: E::Variant) -> Result<E> {
        self.wait_for(variant)?.await
    }

    /// Terminate the run with `err`.
    pub(crate) fn fail(&self, err: WorkflowError) {
        self.state.fail(err);
    }

    fn undeclared(&self, variant: E::Variant) -> WorkflowError {
        WorkflowError::UndeclaredOutput {
            step: self.step.name().to_owned(),
            variant: variant.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run handle
// ---------------------------------------------------------------------------

/// Hosting-shell handle to a live run.
///
/// Unlike [`HandlerContext`] it belongs to no step, so it may only emit
/// variants that some registered step declares as an output.
pub struct RunHandle<E: WorkflowEvent> {
    state: Arc<RunState<E>>,
    accepted: Arc<HashSet<E::Variant>>,
}

impl<E: WorkflowEvent> Clone for RunHandle<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            accepted: Arc::clone(&self.accepted),
        }
    }
}

impl<E: WorkflowEvent> RunHandle<E> {
    pub(crate) fn new(state: Arc<RunState<E>>, accepted: Arc<HashSet<E::Variant>>) -> Self {
        Self { state, accepted }
    }

    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    pub(crate) fn state(&self) -> &RunState<E> {
        &self.state
    }

    /// Inject an event from outside any step.
    ///
    /// Rejected variants do not terminate the run.
    pub fn emit_external(&self, event: E) -> Result<()> {
        let variant = event.variant();
        if !self.accepted.contains(&variant) {
            return Err(WorkflowError::UndeclaredOutput {
                step: "<external>".to_owned(),
                variant: variant.to_string(),
            });
        }
        self.state.deliver(event)
    }

    /// Number of outstanding waits in the run.
    pub fn pending_waits(&self) -> usize {
        self.state.pending_waits()
    }

    /// Whether the run has ended.
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StepRegistry;
    use crate::registry::tests::{Relay, RelayVariant};

    fn context() -> HandlerContext<Relay, u32> {
        let mut registry = StepRegistry::<Relay, u32>::new();
        registry
            .register(
                "forward",
                RelayVariant::Start,
                [RelayVariant::Forward, RelayVariant::Back],
                |_ctx, _event| async { Ok::<_, crate::StepError>(Relay::Forward(0)) },
            )
            .unwrap();
        let step = Arc::clone(registry.get("forward").unwrap());
        HandlerContext::new(
            Arc::new(RunState::new(Uuid::now_v7())),
            Arc::new(Mutex::new(7)),
            step,
            RelayVariant::Start,
        )
    }

    #[tokio::test]
    async fn wait_registered_before_emit_receives_event_once() {
        let ctx = context();
        let waiter = ctx.wait_for(RelayVariant::Back).unwrap();
        assert_eq!(ctx.state.pending_waits(), 1);

        ctx.emit(Relay::Back(3)).unwrap();
        assert_eq!(waiter.await.unwrap(), Relay::Back(3));

        // Consumed by the waiter, so nothing reached the dispatch queue.
        assert!(ctx.state.queue.pop().is_none());
        assert_eq!(ctx.state.pending_waits(), 0);

        // A second emit with no waiter goes to the queue instead.
        ctx.emit(Relay::Back(4)).unwrap();
        assert!(matches!(ctx.state.queue.pop(), Some(Pending::Event(Relay::Back(4)))));
    }

    #[tokio::test]
    async fn overlapping_wait_is_rejected() {
        let ctx = context();
        let _first = ctx.wait_for(RelayVariant::Back).unwrap();
        let err = ctx.wait_for(RelayVariant::Back).unwrap_err();
        assert!(matches!(err, WorkflowError::WaitAlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn dropped_waiter_unregisters() {
        let ctx = context();
        let waiter = ctx.wait_for(RelayVariant::Back).unwrap();
        drop(waiter);
        assert_eq!(ctx.state.pending_waits(), 0);

        // The variant can be awaited again.
        let _again = ctx.wait_for(RelayVariant::Back).unwrap();
    }

    #[tokio::test]
    async fn close_cancels_waiters_and_rejects_emits() {
        let ctx = context();
        let waiter = ctx.wait_for(RelayVariant::Back).unwrap();
        ctx.state.close();

        let err = waiter.await.unwrap_err();
        assert!(matches!(err, WorkflowError::WaitCancelled { .. }));
        assert!(matches!(ctx.emit(Relay::Back(1)), Err(WorkflowError::RunClosed)));
        assert!(matches!(
            ctx.wait_for(RelayVariant::Back),
            Err(WorkflowError::RunClosed)
        ));
    }

    #[tokio::test]
    async fn undeclared_emit_fails_the_run() {
        let ctx = context();
        let err = ctx.emit(Relay::Done).unwrap_err();
        assert!(matches!(err, WorkflowError::UndeclaredOutput { .. }));
        assert!(matches!(
            ctx.state.queue.pop(),
            Some(Pending::Failed(WorkflowError::UndeclaredOutput { .. }))
        ));
    }

    #[tokio::test]
    async fn require_event_resolves_from_another_task() {
        let ctx = context();
        let emitter = ctx.clone();
        let waiting = tokio::spawn(async move { ctx.require_event(RelayVariant::Forward).await });

        // Let the waiter register before emitting.
        while emitter.state.pending_waits() == 0 {
            tokio::task::yield_now().await;
        }
        emitter.emit(Relay::Forward(9)).unwrap();

        let event = waiting.await.unwrap().unwrap();
        assert_eq!(event, Relay::Forward(9));
        assert_eq!(*emitter.data().lock().await, 7);
        assert_eq!(emitter.step(), "forward");
        assert_eq!(emitter.trigger(), RelayVariant::Start);
    }
}
