//! # Thread Management
//!
//! Thread control blocks, handles, the registry and the lifecycle driver.

pub(crate) mod context;
pub(crate) mod control;
mod handle;
pub(crate) mod lifecycle;
mod metrics;
mod registry;
mod states;

pub use handle::ThreadHandle;
pub use metrics::{lifecycle_metrics, LifecycleMetrics};
pub use registry::{lookup, registry, ThreadRegistry};
pub use states::{DetachDisposition, LifecycleState};

use crate::ThreadIdentity;

/// Identity of the calling thread
///
/// A thread the runtime did not create is adopted on first use and gets an
/// identity like any other.
pub fn self_identity() -> ThreadIdentity {
    context::current_identity()
}
