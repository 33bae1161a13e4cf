//! # Thread Handle
//!
//! Shareable reference to a thread, through which it is joined, detached
//! or canceled.

use super::context;
use super::control::ControlBlock;
use super::lifecycle;
use super::metrics::lifecycle_metrics;
use super::{DetachDisposition, LifecycleState};
use crate::cancel;
use crate::exit::ExitPayload;
use crate::{ExecError, ExecResult, ThreadIdentity};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

/// Handle to a thread
///
/// Handles are cheap to clone and may be sent to any thread. Two handles
/// are equal when they refer to the same thread.
#[derive(Clone)]
pub struct ThreadHandle {
    control: Arc<ControlBlock>,
}

impl ThreadHandle {
    pub(crate) fn from_control(control: Arc<ControlBlock>) -> Self {
        Self { control }
    }

    /// Handle to the calling thread
    pub fn current() -> Self {
        Self::from_control(context::current().control().clone())
    }

    /// Get the thread's identity
    pub fn identity(&self) -> ThreadIdentity {
        self.control.id()
    }

    /// Get the name given at creation
    pub fn name(&self) -> Option<&str> {
        self.control.name()
    }

    /// Get the lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.control.state()
    }

    /// Get the detach disposition
    pub fn disposition(&self) -> DetachDisposition {
        self.control.disposition()
    }

    /// Check if the thread has stopped running
    pub fn is_finished(&self) -> bool {
        let state = self.state();
        state.is_terminated() || state.is_reclaimed()
    }

    /// Check if a cancellation request is pending for the thread
    pub fn is_cancel_pending(&self) -> bool {
        self.control.cancel_pending()
    }

    /// Wait for the thread to terminate and collect its exit payload
    ///
    /// Exactly one join succeeds per thread; after it the thread is
    /// reclaimed. This is a cancellation point for the caller.
    ///
    /// # Errors
    ///
    /// - [`ExecError::Deadlock`] if the thread joins itself
    /// - [`ExecError::AlreadyJoined`] if another join was claimed first
    /// - [`ExecError::InvalidOperation`] if the thread is detached
    pub fn join(&self) -> ExecResult<ExitPayload> {
        if context::is_current(&self.control) {
            log::warn!("thread {:?} attempted to join itself", self.identity());
            return Err(ExecError::Deadlock);
        }
        cancel::test_cancellation_point();

        self.control.claim_join()?;
        let id = self.identity();
        lifecycle_trace!("thread {:?}: join claimed", id);

        let flow = self.control.take_flow();
        if let Err(err) = flow.join() {
            log::error!("flow of thread {:?} ended abnormally: {}", id, err);
        }

        let payload = self.control.broker().take().unwrap_or_else(|| {
            log::error!("thread {:?} ended without publishing an exit payload", id);
            ExitPayload::panicked(Box::new("thread ended without an exit payload"))
        });

        self.control.finish_join();
        lifecycle::reclaim(&self.control);
        lifecycle_metrics().record_join();
        log::debug!("joined thread {:?}", id);

        Ok(payload)
    }

    /// Give up the right to join; the thread is reclaimed when it ends
    ///
    /// A thread may detach itself.
    ///
    /// # Errors
    ///
    /// [`ExecError::InvalidOperation`] if the thread is already detached,
    /// or a join has been claimed.
    pub fn detach(&self) -> ExecResult<()> {
        self.control.detach()?;
        lifecycle_metrics().record_detach();
        log::debug!("detached thread {:?}", self.identity());

        if self.state().is_terminated() {
            lifecycle::reclaim(&self.control);
        }
        Ok(())
    }

    /// Ask the thread to cancel
    ///
    /// Only records the request; the thread acts on it according to its
    /// own cancellation settings. Repeated requests collapse into one.
    ///
    /// # Errors
    ///
    /// [`ExecError::NotFound`] if the thread has been reclaimed.
    pub fn cancel(&self) -> ExecResult<()> {
        self.control.request_cancel()?;
        lifecycle_metrics().record_cancel_request();
        log::debug!("cancellation requested for thread {:?}", self.identity());

        if context::is_current(&self.control) {
            cancel::deliver_asynchronous();
        }
        Ok(())
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ThreadHandle {}

impl Hash for ThreadHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("identity", &self.identity())
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
