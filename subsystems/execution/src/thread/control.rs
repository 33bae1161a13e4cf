//! # Thread Control Block
//!
//! The part of a thread shared between the thread itself, its creator and
//! any joiner: lifecycle state, disposal claim, pending cancellation and
//! the exit payload broker.
//!
//! Termination and detach race on two atomics. The terminating thread
//! stores its terminal state and then reads the disposal; a detacher stores
//! the disposal and then reads the state. Both use `SeqCst`, so at least one
//! side observes the other and reclaims, and the reclaim itself is a CAS so
//! only one side does.

use super::states::{DetachDisposition, Disposal, LifecycleState};
use crate::exit::{ExitPayload, ExitPayloadBroker};
use crate::{ExecError, ExecResult, ThreadIdentity};
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};
use strand_substrate::Flow;

/// Control flags
pub mod flags {
    use bitflags::bitflags;

    bitflags! {
        /// Control flags
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct ControlFlags: u32 {
            /// A cancellation request is pending
            const CANCEL_PENDING = 1 << 0;
            /// Thread was not created by the runtime
            const ADOPTED = 1 << 1;
        }
    }
}

pub use flags::ControlFlags;

/// Shared control block of one thread
pub(crate) struct ControlBlock {
    /// Identity
    id: ThreadIdentity,
    /// Name given at creation
    name: Option<String>,
    /// Lifecycle state
    state: AtomicU32,
    /// Disposal claim
    disposal: AtomicU32,
    /// Control flags
    flags: AtomicU32,
    /// Exit payload handoff
    broker: ExitPayloadBroker,
    /// Substrate flow, until join or detach hands it back
    flow: spin::Mutex<Option<Box<dyn Flow>>>,
}

impl ControlBlock {
    /// Create the control block of a thread about to be spawned
    pub(crate) fn new(id: ThreadIdentity, name: Option<String>, detached: bool) -> Self {
        let disposal = if detached { Disposal::Detached } else { Disposal::Joinable };
        Self {
            id,
            name,
            state: AtomicU32::new(LifecycleState::Created.as_u32()),
            disposal: AtomicU32::new(disposal.as_u32()),
            flags: AtomicU32::new(ControlFlags::empty().bits()),
            broker: ExitPayloadBroker::new(),
            flow: spin::Mutex::new(None),
        }
    }

    /// Create the control block of an adopted thread (already running, never joinable)
    pub(crate) fn adopted(id: ThreadIdentity) -> Self {
        let control = Self::new(id, None, true);
        control.set_flag(ControlFlags::ADOPTED);
        control.state.store(LifecycleState::Running.as_u32(), Ordering::SeqCst);
        control
    }

    pub(crate) fn id(&self) -> ThreadIdentity {
        self.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn state(&self) -> LifecycleState {
        let val = self.state.load(Ordering::SeqCst);
        LifecycleState::from_u32(val).unwrap_or(LifecycleState::Reclaimed)
    }

    pub(crate) fn disposal(&self) -> Disposal {
        Disposal::from_u32(self.disposal.load(Ordering::SeqCst))
    }

    pub(crate) fn disposition(&self) -> DetachDisposition {
        self.disposal().disposition()
    }

    pub(crate) fn flags(&self) -> ControlFlags {
        ControlFlags::from_bits_truncate(self.flags.load(Ordering::SeqCst))
    }

    pub(crate) fn has_flag(&self, flag: ControlFlags) -> bool {
        self.flags().contains(flag)
    }

    pub(crate) fn set_flag(&self, flag: ControlFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::SeqCst);
    }

    pub(crate) fn broker(&self) -> &ExitPayloadBroker {
        &self.broker
    }

    pub(crate) fn cancel_pending(&self) -> bool {
        self.has_flag(ControlFlags::CANCEL_PENDING)
    }

    /// Record a cancellation request
    pub(crate) fn request_cancel(&self) -> ExecResult<()> {
        if self.state().is_reclaimed() {
            return Err(ExecError::NotFound);
        }
        self.set_flag(ControlFlags::CANCEL_PENDING);
        Ok(())
    }

    /// Created -> Running, on the new thread
    pub(crate) fn begin_running(&self) {
        if let Err(actual) = self.transition(LifecycleState::Created, LifecycleState::Running) {
            log::error!("thread {:?} started in state {:?}", self.id, actual);
        }
    }

    /// Publish the payload and leave `Running`
    ///
    /// Returns true if the thread is detached, in which case the caller must
    /// reclaim it.
    pub(crate) fn publish_termination(&self, state: LifecycleState, payload: ExitPayload) -> bool {
        self.broker.publish(payload);
        if let Err(actual) = self.transition(LifecycleState::Running, state) {
            log::error!("thread {:?} terminated from state {:?}", self.id, actual);
            return false;
        }
        lifecycle_trace!("thread {:?}: Running -> {:?}", self.id, state);
        matches!(self.disposal(), Disposal::Detached)
    }

    /// Terminal -> Reclaimed; true for the single caller that wins
    pub(crate) fn mark_reclaimed(&self) -> bool {
        let current = self.state();
        current.is_terminated() && self.transition(current, LifecycleState::Reclaimed).is_ok()
    }

    /// Claim the right to join
    pub(crate) fn claim_join(&self) -> ExecResult<()> {
        match self.swap_disposal(Disposal::Joinable, Disposal::Joining) {
            Ok(()) => Ok(()),
            Err(Disposal::Joining | Disposal::Joined) => Err(ExecError::AlreadyJoined),
            Err(_) => Err(ExecError::InvalidOperation),
        }
    }

    /// Mark the claimed join as finished
    pub(crate) fn finish_join(&self) {
        self.disposal.store(Disposal::Joined.as_u32(), Ordering::SeqCst);
    }

    /// Joinable -> Detached, handing the flow back to the substrate
    pub(crate) fn detach(&self) -> ExecResult<()> {
        self.swap_disposal(Disposal::Joinable, Disposal::Detached)
            .map_err(|_| ExecError::InvalidOperation)?;

        if let Some(flow) = self.flow.lock().take() {
            flow.detach();
        }
        Ok(())
    }

    /// Store the substrate flow once spawn has returned it
    ///
    /// Done under the flow lock so a detach racing with spawn cannot miss it.
    pub(crate) fn attach_flow(&self, flow: Box<dyn Flow>) {
        let mut slot = self.flow.lock();
        if matches!(self.disposal(), Disposal::Detached) {
            drop(slot);
            flow.detach();
        } else {
            *slot = Some(flow);
        }
    }

    /// Take the flow for a claimed join
    ///
    /// The thread can hand out its own handle before its creator has
    /// attached the flow, so wait for the attach if necessary.
    pub(crate) fn take_flow(&self) -> Box<dyn Flow> {
        loop {
            if let Some(flow) = self.flow.lock().take() {
                return flow;
            }
            std::thread::yield_now();
        }
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleState> {
        debug_assert!(from.can_transition_to(to), "{:?} -> {:?}", from, to);
        self.state
            .compare_exchange(from.as_u32(), to.as_u32(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| LifecycleState::from_u32(actual).unwrap_or(LifecycleState::Reclaimed))
    }

    fn swap_disposal(&self, from: Disposal, to: Disposal) -> Result<(), Disposal> {
        self.disposal
            .compare_exchange(from.as_u32(), to.as_u32(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(Disposal::from_u32)
    }
}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("disposal", &self.disposal())
            .field("flags", &self.flags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> ControlBlock {
        ControlBlock::new(ThreadIdentity::allocate().unwrap(), None, false)
    }

    #[test]
    fn test_join_claim_is_exclusive() {
        let control = control();
        assert_eq!(control.claim_join(), Ok(()));
        assert_eq!(control.claim_join(), Err(ExecError::AlreadyJoined));
        assert_eq!(control.detach(), Err(ExecError::InvalidOperation));

        control.finish_join();
        assert_eq!(control.claim_join(), Err(ExecError::AlreadyJoined));
        assert_eq!(control.disposition(), DetachDisposition::Detached);
    }

    #[test]
    fn test_detach_is_one_way() {
        let control = control();
        assert_eq!(control.detach(), Ok(()));
        assert_eq!(control.detach(), Err(ExecError::InvalidOperation));
        assert_eq!(control.claim_join(), Err(ExecError::InvalidOperation));
    }

    #[test]
    fn test_termination_then_single_reclaim() {
        let control = control();
        control.begin_running();
        assert!(!control.mark_reclaimed());

        let detached = control.publish_termination(LifecycleState::Canceled, ExitPayload::canceled());
        assert!(!detached);
        assert_eq!(control.state(), LifecycleState::Canceled);
        assert!(control.broker().is_published());

        assert!(control.mark_reclaimed());
        assert!(!control.mark_reclaimed());
        assert_eq!(control.state(), LifecycleState::Reclaimed);
    }

    #[test]
    fn test_detached_termination_requests_reclaim() {
        let control = ControlBlock::new(ThreadIdentity::allocate().unwrap(), None, true);
        control.begin_running();
        assert!(control.publish_termination(LifecycleState::ReturnedNormally, ExitPayload::new(())));
    }

    #[test]
    fn test_cancel_request_after_reclaim() {
        let control = control();
        assert_eq!(control.request_cancel(), Ok(()));
        assert!(control.cancel_pending());

        control.begin_running();
        control.publish_termination(LifecycleState::ExitedExplicitly, ExitPayload::new(1u8));
        assert_eq!(control.request_cancel(), Ok(()));

        control.mark_reclaimed();
        assert_eq!(control.request_cancel(), Err(ExecError::NotFound));
    }

    #[test]
    fn test_adopted_control() {
        let control = ControlBlock::adopted(ThreadIdentity::allocate().unwrap());
        assert!(control.has_flag(ControlFlags::ADOPTED));
        assert_eq!(control.state(), LifecycleState::Running);
        assert_eq!(control.disposition(), DetachDisposition::Detached);
    }
}
