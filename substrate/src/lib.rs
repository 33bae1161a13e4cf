//! # Strand Substrate - Execution Substrate Abstraction
//!
//! This crate defines the primitives the lifecycle runtime consumes from the
//! layer underneath it. A substrate must be able to:
//! - Spawn an independent flow of control sharing the caller's address space
//! - Let a flow of control terminate itself
//! - Block a caller until another flow of control finishes
//!
//! ## Design Philosophy
//!
//! The substrate knows nothing about join/detach disposition, cancellation or
//! cleanup handlers. It moves raw flows of control around; the execution
//! subsystem builds the lifecycle protocol on top of it.

#![warn(missing_docs)]

pub mod std_threads;

pub use std_threads::StdSubstrate;

use core::any::Any;
use core::fmt;

/// Result type for substrate operations
pub type SubstrateResult<T> = Result<T, SubstrateError>;

/// Errors reported by a substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstrateError {
    /// No new flow of control could be created
    Exhausted,
    /// The flow of control ended with an unwind it did not handle
    Aborted,
}

impl fmt::Display for SubstrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "substrate could not create a flow of control"),
            Self::Aborted => write!(f, "flow of control ended with an unhandled unwind"),
        }
    }
}

impl std::error::Error for SubstrateError {}

/// Creation parameters for a flow of control
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSpec {
    /// Name, for debuggers and panic messages
    pub name: Option<String>,
    /// Stack size in bytes (substrate default if `None`)
    pub stack_size: Option<usize>,
}

impl FlowSpec {
    /// Create an unnamed spec with the default stack size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the stack size
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

/// Code run by a new flow of control
pub type FlowBody = Box<dyn FnOnce() + Send + 'static>;

/// A running (or finished) flow of control owned by its creator
pub trait Flow: Send {
    /// Block until the flow finishes
    fn join(self: Box<Self>) -> SubstrateResult<()>;

    /// Give the flow up; the substrate reclaims it when it finishes
    fn detach(self: Box<Self>);

    /// Check whether the flow has finished
    fn is_finished(&self) -> bool;
}

/// The execution substrate trait
///
/// Implementations must be shareable between every flow of control they
/// create, since a flow may spawn further flows.
pub trait ExecutionSubstrate: Send + Sync + 'static {
    /// Get the substrate name
    fn name(&self) -> &'static str;

    /// Start a new flow of control running `body`
    fn spawn(&self, spec: FlowSpec, body: FlowBody) -> SubstrateResult<Box<dyn Flow>>;

    /// Terminate the calling flow of control
    ///
    /// The default implementation unwinds with the [`Termination`] marker,
    /// which flows created by a substrate are expected to absorb.
    fn terminate_current(&self) -> ! {
        terminate_current()
    }
}

static_assertions::assert_obj_safe!(ExecutionSubstrate, Flow);

/// Unwind payload used to terminate a flow of control
///
/// Only this crate can construct it, so an unwind carrying it always
/// originates from [`terminate_current`].
#[derive(Debug)]
pub struct Termination {
    _private: (),
}

/// Terminate the calling flow of control by unwinding it
///
/// The unwind does not run the panic hook. Every frame between here and the
/// flow's entry point is dropped on the way out.
pub fn terminate_current() -> ! {
    std::panic::resume_unwind(Box::new(Termination { _private: () }))
}

/// Check whether an unwind payload is the termination marker
pub fn is_termination(payload: &(dyn Any + Send)) -> bool {
    payload.is::<Termination>()
}
