//! # Thread Context
//!
//! State owned by exactly one thread: its cleanup stack, its cancellation
//! settings and the record of how it is terminating. Reached through a
//! thread-local slot, so none of it needs locking.

use super::control::{ControlBlock, ControlFlags};
use super::lifecycle;
use super::registry::registry;
use super::LifecycleState;
use crate::cancel::{CancelState, CancelType, CancellationController};
use crate::cleanup::{CleanupEntry, CleanupStack};
use crate::exit::{ExitPayload, TerminationRecord};
use crate::runtime::Runtime;
use crate::ThreadIdentity;
use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use strand_substrate::ExecutionSubstrate;

thread_local! {
    /// Context of the thread running on this OS thread
    static CURRENT: RefCell<Option<Rc<ThreadContext>>> = const { RefCell::new(None) };
}

/// Everything a new thread needs to build its context
pub(crate) struct ContextSeed {
    pub(crate) control: Arc<ControlBlock>,
    pub(crate) substrate: Arc<dyn ExecutionSubstrate>,
    pub(crate) cancel_state: CancelState,
    pub(crate) cancel_type: CancelType,
}

/// Per-thread runtime context
pub(crate) struct ThreadContext {
    control: Arc<ControlBlock>,
    substrate: Arc<dyn ExecutionSubstrate>,
    cleanup: RefCell<CleanupStack>,
    cancellation: CancellationController,
    terminating: Cell<bool>,
    termination: RefCell<Option<TerminationRecord>>,
}

impl ThreadContext {
    fn new(seed: ContextSeed) -> Self {
        Self {
            control: seed.control,
            substrate: seed.substrate,
            cleanup: RefCell::new(CleanupStack::new()),
            cancellation: CancellationController::new(seed.cancel_state, seed.cancel_type),
            terminating: Cell::new(false),
            termination: RefCell::new(None),
        }
    }

    pub(crate) fn identity(&self) -> ThreadIdentity {
        self.control.id()
    }

    pub(crate) fn control(&self) -> &Arc<ControlBlock> {
        &self.control
    }

    pub(crate) fn substrate(&self) -> &Arc<dyn ExecutionSubstrate> {
        &self.substrate
    }

    pub(crate) fn cancellation(&self) -> &CancellationController {
        &self.cancellation
    }

    pub(crate) fn is_adopted(&self) -> bool {
        self.control.has_flag(ControlFlags::ADOPTED)
    }

    /// Enabled, not already terminating, and a request is pending
    pub(crate) fn cancellation_due(&self) -> bool {
        self.cancellation.is_enabled() && !self.terminating.get() && self.control.cancel_pending()
    }

    pub(crate) fn push_cleanup(&self, entry: CleanupEntry) -> usize {
        self.cleanup.borrow_mut().push(entry)
    }

    pub(crate) fn pop_cleanup_at(&self, depth: usize) -> Option<CleanupEntry> {
        self.cleanup.borrow_mut().pop_at(depth)
    }

    pub(crate) fn cleanup_depth(&self) -> usize {
        self.cleanup.borrow().len()
    }

    /// Run every pushed handler, most recent first
    ///
    /// Each entry is removed before it runs, so a handler may push or pop
    /// handlers of its own.
    pub(crate) fn unwind_cleanup(&self) -> usize {
        let mut ran = 0;
        loop {
            let entry = self.cleanup.borrow_mut().pop();
            match entry {
                Some(entry) => {
                    entry.run();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Drop every pushed handler unrun (plain return)
    pub(crate) fn discard_cleanup(&self) -> usize {
        self.cleanup.borrow_mut().discard_all()
    }

    /// From here on the thread cannot be canceled
    pub(crate) fn begin_termination(&self) {
        self.terminating.set(true);
        self.cancellation.set_state(CancelState::Disabled);
    }

    pub(crate) fn record_termination(&self, record: TerminationRecord) {
        *self.termination.borrow_mut() = Some(record);
    }

    pub(crate) fn take_termination(&self) -> Option<TerminationRecord> {
        self.termination.borrow_mut().take()
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        // An adopted thread has no trampoline; its TLS teardown is its end.
        if self.is_adopted() && self.control.state() == LifecycleState::Running {
            let (state, payload) = match self.take_termination() {
                Some(record) => (record.reason.state(), record.payload),
                None => (LifecycleState::ReturnedNormally, ExitPayload::new(())),
            };
            lifecycle::retire(&self.control, state, payload);
        }
    }
}

/// Install the context of a freshly started thread
pub(crate) fn install(seed: ContextSeed) -> Rc<ThreadContext> {
    let ctx = Rc::new(ThreadContext::new(seed));
    CURRENT.with(|slot| *slot.borrow_mut() = Some(ctx.clone()));
    ctx
}

/// Remove the calling thread's context
pub(crate) fn uninstall() {
    let _ = CURRENT.try_with(|slot| slot.borrow_mut().take());
}

/// Context of the calling thread, adopting the thread if it has none
pub(crate) fn current() -> Rc<ThreadContext> {
    CURRENT.with(|slot| {
        if let Some(ctx) = slot.borrow().as_ref() {
            return ctx.clone();
        }
        let ctx = adopt();
        *slot.borrow_mut() = Some(ctx.clone());
        ctx
    })
}

/// Run `f` on the calling thread's context, if it has one and TLS is alive
pub(crate) fn try_with_current<R>(f: impl FnOnce(&ThreadContext) -> R) -> Option<R> {
    CURRENT
        .try_with(|slot| slot.borrow().as_deref().map(f))
        .ok()
        .flatten()
}

/// Identity of the calling thread
pub(crate) fn current_identity() -> ThreadIdentity {
    current().identity()
}

/// Check whether `control` belongs to the calling thread
pub(crate) fn is_current(control: &Arc<ControlBlock>) -> bool {
    try_with_current(|ctx| Arc::ptr_eq(ctx.control(), control)).unwrap_or(false)
}

/// Give a thread the runtime did not create a context of its own
///
/// # Panics
///
/// Panics if the identity space is exhausted, which takes 2^64 identities.
/// Adoption happens inside queries that have no error path.
fn adopt() -> Rc<ThreadContext> {
    let runtime = Runtime::global();
    let id = ThreadIdentity::allocate().expect("thread identity space exhausted");
    let control = Arc::new(ControlBlock::adopted(id));

    if registry().register(control.clone()).is_err() {
        log::error!("adopted thread {:?} collides with a registered identity", control.id());
    }
    log::debug!("adopted foreign thread as {:?}", control.id());

    Rc::new(ThreadContext::new(ContextSeed {
        control,
        substrate: runtime.substrate().clone(),
        cancel_state: CancelState::default(),
        cancel_type: CancelType::default(),
    }))
}
