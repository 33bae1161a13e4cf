//! # Strand Execution Subsystem
//!
//! The execution subsystem manages the lifecycle of threads running on an
//! execution substrate:
//! - Thread creation, join and detach
//! - Explicit exit with an exit payload
//! - Deferred and asynchronous cancellation
//! - LIFO cleanup handlers
//!
//! ## Lifecycle
//!
//! ```text
//!   Created ──> Running ──┬──> ReturnedNormally ──┐
//!                         ├──> ExitedExplicitly ──┤
//!                         ├──> Canceled ──────────┼──> Reclaimed  (join, or detach + termination)
//!                         └──> Panicked ──────────┘
//! ```
//!
//! Exactly one of join or detach disposes of a thread. Cleanup handlers run
//! on exit, cancellation and panic, never on a plain return from the entry
//! routine.
//!
//! ## Example
//!
//! ```
//! use strand_execution::{cleanup, exit_current, spawn};
//!
//! let handle = spawn(
//!     |base: u32| {
//!         let _guard = cleanup::push(|| println!("released"));
//!         exit_current(base * 2)
//!     },
//!     21,
//! )
//! .unwrap();
//!
//! let payload = handle.join().unwrap();
//! assert_eq!(payload.downcast_ref::<u32>(), Some(&42));
//! ```

#![warn(missing_docs)]

/// Trace a lifecycle transition (compiled in with `lifecycle-trace`)
macro_rules! lifecycle_trace {
    ($($arg:tt)*) => {
        if cfg!(feature = "lifecycle-trace") {
            log::trace!($($arg)*);
        }
    };
}

pub mod cancel;
pub mod cleanup;
pub mod exit;
pub mod runtime;
pub mod thread;

pub use cancel::{
    is_cancel_pending, set_cancel_state, set_cancel_type, test_cancellation_point, CancelState,
    CancelType,
};
pub use cleanup::CleanupGuard;
pub use exit::{exit_current, ExitPayload};
pub use runtime::{spawn, Runtime, ThreadAttributes};
pub use thread::{
    lifecycle_metrics, lookup, registry, self_identity, DetachDisposition, LifecycleMetrics,
    LifecycleState, ThreadHandle, ThreadRegistry,
};

use core::fmt;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of a flow of control
///
/// Identities compare for equality only. They carry no ordering and no
/// portable textual form; a thread learns its own identity through
/// [`self_identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadIdentity(NonZeroU64);

impl ThreadIdentity {
    /// Allocate a fresh identity
    pub(crate) fn allocate() -> ExecResult<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        let raw = NEXT
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(1)
            })
            .map_err(|_| {
                log::error!("thread identity space exhausted");
                ExecError::ResourceExhausted
            })?;

        NonZeroU64::new(raw)
            .map(Self)
            .ok_or(ExecError::ResourceExhausted)
    }

    /// Identity of the calling thread
    pub fn current() -> Self {
        self_identity()
    }
}

/// Execution result type
pub type ExecResult<T> = Result<T, ExecError>;

/// Execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// The substrate could not create a new flow of control
    ResourceExhausted,
    /// Join or detach against an incompatible disposition
    InvalidOperation,
    /// Another caller has already claimed the join
    AlreadyJoined,
    /// A thread tried to join itself
    Deadlock,
    /// The runtime no longer tracks the thread
    NotFound,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceExhausted => write!(f, "no flow of control could be created"),
            Self::InvalidOperation => write!(f, "operation invalid for the thread's disposition"),
            Self::AlreadyJoined => write!(f, "thread is already joined by another caller"),
            Self::Deadlock => write!(f, "thread attempted to join itself"),
            Self::NotFound => write!(f, "thread is no longer tracked"),
        }
    }
}

impl std::error::Error for ExecError {}

static_assertions::assert_impl_all!(ThreadIdentity: Send, Sync, Copy, Eq, core::hash::Hash);
static_assertions::assert_not_impl_any!(ThreadIdentity: PartialOrd, Ord, fmt::Display);
static_assertions::assert_impl_all!(ThreadHandle: Send, Sync, Clone);
static_assertions::assert_not_impl_any!(CleanupGuard: Send, Sync);
static_assertions::assert_impl_all!(ExitPayload: Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_are_unique() {
        let a = ThreadIdentity::allocate().unwrap();
        let b = ThreadIdentity::allocate().unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_current_identity_is_stable() {
        assert_eq!(ThreadIdentity::current(), self_identity());
    }

    #[test]
    fn test_identity_differs_across_threads() {
        let here = self_identity();
        let there = std::thread::spawn(self_identity).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ExecError::Deadlock.to_string(), "thread attempted to join itself");
        assert_eq!(
            ExecError::AlreadyJoined.to_string(),
            "thread is already joined by another caller"
        );
    }
}
