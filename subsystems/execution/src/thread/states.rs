//! # Thread States
//!
//! Lifecycle state machine and disposal disposition.

/// Lifecycle state (unit-only for atomic storage)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LifecycleState {
    /// Thread is being created
    Created = 0,
    /// Entry routine is executing
    Running = 1,
    /// Entry routine returned
    ReturnedNormally = 2,
    /// Thread called `exit_current`
    ExitedExplicitly = 3,
    /// A cancellation request was acted upon
    Canceled = 4,
    /// A panic escaped the entry routine
    Panicked = 5,
    /// Resources released after join or detach (terminal)
    Reclaimed = 6,
}

impl LifecycleState {
    /// Convert from u32
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Created),
            1 => Some(Self::Running),
            2 => Some(Self::ReturnedNormally),
            3 => Some(Self::ExitedExplicitly),
            4 => Some(Self::Canceled),
            5 => Some(Self::Panicked),
            6 => Some(Self::Reclaimed),
            _ => None,
        }
    }

    /// Convert to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if the thread has stopped running but is not yet reclaimed
    pub fn is_terminated(&self) -> bool {
        matches!(
            self,
            Self::ReturnedNormally | Self::ExitedExplicitly | Self::Canceled | Self::Panicked
        )
    }

    /// Check if the thread is gone for good
    pub fn is_reclaimed(&self) -> bool {
        matches!(self, Self::Reclaimed)
    }

    /// Valid transitions from this state
    pub fn valid_transitions(&self) -> &[LifecycleState] {
        match self {
            Self::Created => &[Self::Running],
            Self::Running => &[
                Self::ReturnedNormally,
                Self::ExitedExplicitly,
                Self::Canceled,
                Self::Panicked,
            ],
            Self::ReturnedNormally | Self::ExitedExplicitly | Self::Canceled | Self::Panicked => {
                &[Self::Reclaimed]
            }
            Self::Reclaimed => &[],
        }
    }

    /// Check whether `next` may follow this state
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Created
    }
}

/// Who is responsible for reclaiming the thread
///
/// `Joinable -> Detached` is the only transition; `Detached` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachDisposition {
    /// Termination status is retained until a join collects it
    Joinable,
    /// Resources are reclaimed automatically at termination
    Detached,
}

/// Disposal claim as stored in the control block
///
/// Refines [`DetachDisposition`]: a join in progress still reports
/// `Joinable`, a completed join reports `Detached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum Disposal {
    Joinable = 0,
    Joining = 1,
    Joined = 2,
    Detached = 3,
}

impl Disposal {
    pub(crate) fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Joinable,
            1 => Self::Joining,
            2 => Self::Joined,
            _ => Self::Detached,
        }
    }

    pub(crate) fn as_u32(self) -> u32 {
        self as u32
    }

    pub(crate) fn disposition(self) -> DetachDisposition {
        match self {
            Self::Joinable | Self::Joining => DetachDisposition::Joinable,
            Self::Joined | Self::Detached => DetachDisposition::Detached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_encoding() {
        for value in 0..=6 {
            let state = LifecycleState::from_u32(value).unwrap();
            assert_eq!(state.as_u32(), value);
        }
        assert_eq!(LifecycleState::from_u32(7), None);
    }

    #[test]
    fn test_running_leaves_exactly_once() {
        for terminal in [
            LifecycleState::ReturnedNormally,
            LifecycleState::ExitedExplicitly,
            LifecycleState::Canceled,
            LifecycleState::Panicked,
        ] {
            assert!(LifecycleState::Running.can_transition_to(terminal));
            assert!(terminal.is_terminated());
            assert!(!terminal.can_transition_to(LifecycleState::Running));
            assert_eq!(terminal.valid_transitions(), &[LifecycleState::Reclaimed]);
        }
    }

    #[test]
    fn test_reclaimed_is_absorbing() {
        assert!(LifecycleState::Reclaimed.valid_transitions().is_empty());
        assert!(LifecycleState::Reclaimed.is_reclaimed());
        assert!(!LifecycleState::Reclaimed.is_terminated());
        assert!(!LifecycleState::Running.can_transition_to(LifecycleState::Reclaimed));
    }

    #[test]
    fn test_disposal_reports_disposition() {
        assert_eq!(Disposal::Joining.disposition(), DetachDisposition::Joinable);
        assert_eq!(Disposal::Joined.disposition(), DetachDisposition::Detached);
        assert_eq!(Disposal::from_u32(Disposal::Detached.as_u32()), Disposal::Detached);
    }
}
