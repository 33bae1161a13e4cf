//! # Cancellation
//!
//! Per-thread cancellation settings and delivery.
//!
//! A request made with [`ThreadHandle::cancel`](crate::ThreadHandle::cancel)
//! only sets a pending flag on the target. The target acts on it:
//! - **Deferred**: at the next cancellation point ([`test_cancellation_point`],
//!   or [`ThreadHandle::join`](crate::ThreadHandle::join) before it blocks)
//! - **Asynchronous**: at the next runtime call the thread makes, including
//!   the call that enables cancellation or switches to asynchronous mode
//!
//! Acting on a request runs the thread's cleanup handlers and terminates it
//! with the [`ExitPayload::canceled`] sentinel. Nothing happens while
//! cancellation is disabled; the request stays pending.

use crate::exit::{self, ExitPayload, TerminationReason};
use crate::thread::context;
use core::cell::Cell;

/// Whether cancellation requests are acted upon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelState {
    /// Requests are acted upon
    #[default]
    Enabled,
    /// Requests stay pending
    Disabled,
}

/// When an enabled thread acts on a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelType {
    /// Only at cancellation points
    #[default]
    Deferred,
    /// At any runtime call
    ///
    /// Code holding partially-updated shared invariants must not run in
    /// this mode.
    Asynchronous,
}

/// Cancellation settings of one thread
///
/// Lives in the thread's own context and is only touched by that thread.
#[derive(Debug, Default)]
pub struct CancellationController {
    state: Cell<CancelState>,
    kind: Cell<CancelType>,
}

impl CancellationController {
    /// Create a controller
    pub fn new(state: CancelState, kind: CancelType) -> Self {
        Self {
            state: Cell::new(state),
            kind: Cell::new(kind),
        }
    }

    /// Current state
    pub fn state(&self) -> CancelState {
        self.state.get()
    }

    /// Current type
    pub fn kind(&self) -> CancelType {
        self.kind.get()
    }

    /// Set the state, returning the previous one
    pub fn set_state(&self, state: CancelState) -> CancelState {
        self.state.replace(state)
    }

    /// Set the type, returning the previous one
    pub fn set_kind(&self, kind: CancelType) -> CancelType {
        self.kind.replace(kind)
    }

    /// Check if requests are acted upon
    pub fn is_enabled(&self) -> bool {
        self.state() == CancelState::Enabled
    }

    /// Check if requests are acted upon outside cancellation points
    pub fn is_asynchronous(&self) -> bool {
        self.is_enabled() && self.kind() == CancelType::Asynchronous
    }
}

/// Enable or disable cancellation for the calling thread
///
/// Returns the previous state. Re-enabling an asynchronous thread with a
/// request pending acts on it immediately.
pub fn set_cancel_state(state: CancelState) -> CancelState {
    let previous = context::current().cancellation().set_state(state);
    deliver_asynchronous();
    previous
}

/// Choose deferred or asynchronous cancellation for the calling thread
///
/// Returns the previous type. Switching to asynchronous with a request
/// pending acts on it immediately.
pub fn set_cancel_type(kind: CancelType) -> CancelType {
    let previous = context::current().cancellation().set_kind(kind);
    deliver_asynchronous();
    previous
}

/// Cancellation point: act on a pending request if cancellation is enabled
pub fn test_cancellation_point() {
    if context::current().cancellation_due() {
        deliver();
    }
}

/// Check whether the calling thread has a request it has not acted on
pub fn is_cancel_pending() -> bool {
    context::current().control().cancel_pending()
}

/// Delivery point for asynchronous cancellation
pub(crate) fn deliver_asynchronous() {
    let due = context::try_with_current(|ctx| {
        ctx.cancellation().is_asynchronous() && ctx.cancellation_due()
    });
    if due == Some(true) {
        deliver();
    }
}

fn deliver() -> ! {
    log::debug!("thread {:?} acting on cancellation request", context::current_identity());
    exit::terminate(TerminationReason::Canceled, ExitPayload::canceled())
}
