//! # Thread Exit
//!
//! Exit payloads, the single-slot broker that hands them to a joiner, and
//! explicit termination of the calling thread.
//!
//! A payload must own its data or share it with the joiner. Memory that
//! belongs to the terminating thread's own stack is gone by the time a
//! joiner looks at the payload, so the `'static` bound on payloads rejects
//! it outright:
//!
//! ```compile_fail
//! use strand_execution::exit_current;
//!
//! let scratch = [0u8; 16];
//! exit_current(&scratch);
//! ```

use crate::thread::context;
use crate::thread::LifecycleState;
use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

/// Value a terminating thread hands to its joiner
///
/// The runtime never looks inside the value; it only moves ownership from
/// the terminating thread to the winning joiner.
pub struct ExitPayload {
    kind: PayloadKind,
}

enum PayloadKind {
    Value(Box<dyn Any + Send>),
    Canceled,
    Panicked(Box<dyn Any + Send>),
}

impl ExitPayload {
    /// Wrap a value
    ///
    /// An `ExitPayload` passed in is returned unchanged.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self::from_boxed(Box::new(value))
    }

    /// Wrap an already boxed value
    pub fn from_boxed(value: Box<dyn Any + Send>) -> Self {
        match value.downcast::<ExitPayload>() {
            Ok(payload) => *payload,
            Err(value) => Self {
                kind: PayloadKind::Value(value),
            },
        }
    }

    /// The reserved "canceled" sentinel
    pub const fn canceled() -> Self {
        Self {
            kind: PayloadKind::Canceled,
        }
    }

    /// Payload for a thread whose entry routine panicked
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        Self {
            kind: PayloadKind::Panicked(payload),
        }
    }

    /// Check for the cancellation sentinel
    pub fn is_canceled(&self) -> bool {
        matches!(self.kind, PayloadKind::Canceled)
    }

    /// Check whether the thread panicked
    pub fn is_panic(&self) -> bool {
        matches!(self.kind, PayloadKind::Panicked(_))
    }

    /// Check whether the payload holds a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Borrow the value as a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match &self.kind {
            PayloadKind::Value(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Take the value out as a `T`
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self.kind {
            PayloadKind::Value(value) => match value.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(value) => Err(Self {
                    kind: PayloadKind::Value(value),
                }),
            },
            kind => Err(Self { kind }),
        }
    }

    /// Take the panic payload, for `std::panic::resume_unwind`
    pub fn into_panic(self) -> Result<Box<dyn Any + Send>, Self> {
        match self.kind {
            PayloadKind::Panicked(payload) => Ok(payload),
            kind => Err(Self { kind }),
        }
    }
}

impl fmt::Debug for ExitPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PayloadKind::Value(_) => f.write_str("ExitPayload::Value(..)"),
            PayloadKind::Canceled => f.write_str("ExitPayload::Canceled"),
            PayloadKind::Panicked(_) => f.write_str("ExitPayload::Panicked(..)"),
        }
    }
}

/// Single-slot handoff from the terminating thread to one joiner
///
/// Written at most once, read at most once. Whatever is left in the slot
/// when the thread is reclaimed is dropped.
#[derive(Debug, Default)]
pub struct ExitPayloadBroker {
    written: AtomicBool,
    slot: Mutex<Option<ExitPayload>>,
}

impl ExitPayloadBroker {
    /// Create an empty broker
    pub const fn new() -> Self {
        Self {
            written: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    /// Store the payload; refused if one was already published
    pub fn publish(&self, payload: ExitPayload) -> bool {
        if self.written.swap(true, Ordering::AcqRel) {
            log::error!("exit payload published twice; keeping the first");
            return false;
        }
        *self.slot.lock() = Some(payload);
        true
    }

    /// Check whether a payload was ever published
    pub fn is_published(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    /// Take the payload out (at most one caller gets it)
    pub fn take(&self) -> Option<ExitPayload> {
        self.slot.lock().take()
    }

    /// Drop an unclaimed payload
    pub fn discard(&self) -> bool {
        self.take().is_some()
    }
}

/// Why a thread ended through the termination unwind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TerminationReason {
    /// `exit_current`
    Exited,
    /// A delivered cancellation request
    Canceled,
}

impl TerminationReason {
    pub(crate) fn state(self) -> LifecycleState {
        match self {
            Self::Exited => LifecycleState::ExitedExplicitly,
            Self::Canceled => LifecycleState::Canceled,
        }
    }
}

/// Outcome stashed in the thread context until the entry trampoline sees it
#[derive(Debug)]
pub(crate) struct TerminationRecord {
    pub(crate) reason: TerminationReason,
    pub(crate) payload: ExitPayload,
}

/// Terminate the calling thread, handing `payload` to its joiner
///
/// Runs every cleanup handler still pushed, most recent first, then ends
/// the thread. Never returns.
///
/// The thread ends by unwinding its stack. An entry routine that catches
/// that unwind with `std::panic::catch_unwind` regains control, but the
/// thread still ends with `payload` once the entry routine returns; its
/// return value is discarded.
///
/// Passing [`ExitPayload::canceled`] cancels the thread instead: it ends in
/// the `Canceled` state, so the sentinel always means a cancellation.
pub fn exit_current<T: Any + Send>(payload: T) -> ! {
    let payload = ExitPayload::new(payload);
    if payload.is_canceled() {
        log::debug!("exit with the canceled sentinel; terminating as canceled");
        return terminate(TerminationReason::Canceled, payload);
    }
    terminate(TerminationReason::Exited, payload)
}

/// Shared tail of explicit exit and cancellation
pub(crate) fn terminate(reason: TerminationReason, payload: ExitPayload) -> ! {
    let ctx = context::current();
    ctx.begin_termination();

    let ran = ctx.unwind_cleanup();
    lifecycle_trace!("thread {:?} ran {} cleanup handlers ({:?})", ctx.identity(), ran, reason);

    if ctx.is_adopted() {
        log::warn!(
            "thread {:?} was not spawned by the runtime; terminating it unwinds to its outer frame",
            ctx.identity()
        );
    }

    ctx.record_termination(TerminationRecord { reason, payload });
    let substrate = ctx.substrate().clone();
    drop(ctx);
    substrate.terminate_current()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_payload_downcast() {
        let payload = ExitPayload::new(42u32);
        assert!(payload.is::<u32>());
        assert!(!payload.is::<i64>());
        assert_eq!(payload.downcast_ref::<u32>(), Some(&42));

        let payload = payload.downcast::<String>().unwrap_err();
        assert_eq!(payload.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_canceled_sentinel() {
        let payload = ExitPayload::canceled();
        assert!(payload.is_canceled());
        assert!(!payload.is_panic());
        assert!(payload.downcast_ref::<()>().is_none());
    }

    #[test]
    fn test_payload_is_not_double_wrapped() {
        let payload = ExitPayload::new(ExitPayload::canceled());
        assert!(payload.is_canceled());

        let payload = ExitPayload::new(ExitPayload::new("inner"));
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"inner"));
    }

    #[test]
    fn test_panic_payload() {
        let payload = ExitPayload::panicked(Box::new("boom"));
        assert!(payload.is_panic());
        let inner = payload.into_panic().unwrap();
        assert_eq!(inner.downcast_ref::<&str>(), Some(&"boom"));

        assert!(ExitPayload::new(1u8).into_panic().is_err());
    }

    #[test]
    fn test_broker_write_once_read_once() {
        let broker = ExitPayloadBroker::new();
        assert!(!broker.is_published());

        assert!(broker.publish(ExitPayload::new(1u32)));
        assert!(!broker.publish(ExitPayload::new(2u32)));
        assert!(broker.is_published());

        let payload = broker.take().unwrap();
        assert_eq!(payload.downcast_ref::<u32>(), Some(&1));
        assert!(broker.take().is_none());
    }

    #[test]
    fn test_broker_discard_drops_payload() {
        let shared = Arc::new(());
        let broker = ExitPayloadBroker::new();
        broker.publish(ExitPayload::new(shared.clone()));
        assert_eq!(Arc::strong_count(&shared), 2);

        assert!(broker.discard());
        assert_eq!(Arc::strong_count(&shared), 1);
        assert!(!broker.discard());
    }
}
