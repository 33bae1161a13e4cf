//! # Runtime
//!
//! Thread creation on top of an execution substrate.

use crate::cancel::{CancelState, CancelType};
use crate::exit::ExitPayload;
use crate::thread::context::ContextSeed;
use crate::thread::control::ControlBlock;
use crate::thread::{lifecycle, lifecycle_metrics, registry, ThreadHandle};
use crate::{ExecError, ExecResult, ThreadIdentity};
use core::any::Any;
use core::fmt;
use std::sync::Arc;
use strand_substrate::{ExecutionSubstrate, FlowBody, FlowSpec, StdSubstrate};

/// Creation attributes of a thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadAttributes {
    name: Option<String>,
    stack_size: Option<usize>,
    detached: bool,
    cancel_state: CancelState,
    cancel_type: CancelType,
}

impl ThreadAttributes {
    /// Joinable, unnamed, default stack, deferred cancellation enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the thread
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Request a stack size in bytes
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Create the thread already detached
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Initial cancellation state
    pub fn with_cancel_state(mut self, state: CancelState) -> Self {
        self.cancel_state = state;
        self
    }

    /// Initial cancellation type
    pub fn with_cancel_type(mut self, kind: CancelType) -> Self {
        self.cancel_type = kind;
        self
    }

    /// Get the name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the requested stack size
    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }

    /// Check whether the thread starts detached
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    fn flow_spec(&self) -> FlowSpec {
        FlowSpec {
            name: self.name.clone(),
            stack_size: self.stack_size,
        }
    }
}

/// Thread runtime bound to one execution substrate
#[derive(Clone)]
pub struct Runtime {
    substrate: Arc<dyn ExecutionSubstrate>,
}

impl Runtime {
    /// Create a runtime on `substrate`
    pub fn new(substrate: Arc<dyn ExecutionSubstrate>) -> Self {
        Self { substrate }
    }

    /// The process-wide runtime, backed by OS threads
    pub fn global() -> &'static Runtime {
        static GLOBAL: spin::Lazy<Runtime> =
            spin::Lazy::new(|| Runtime::new(Arc::new(StdSubstrate::new())));
        &GLOBAL
    }

    /// Get the substrate
    pub fn substrate(&self) -> &Arc<dyn ExecutionSubstrate> {
        &self.substrate
    }

    /// Spawn a joinable thread running `entry(argument)`
    pub fn spawn<F, A, R>(&self, entry: F, argument: A) -> ExecResult<ThreadHandle>
    where
        F: FnOnce(A) -> R + Send + 'static,
        A: Send + 'static,
        R: Any + Send,
    {
        self.spawn_with(ThreadAttributes::default(), entry, argument)
    }

    /// Spawn a thread with explicit attributes
    ///
    /// The thread is registered before the substrate starts it, so the new
    /// thread can look itself up from its first instruction.
    ///
    /// # Errors
    ///
    /// [`ExecError::ResourceExhausted`] if no identity is left or the
    /// substrate refuses to create the flow.
    pub fn spawn_with<F, A, R>(
        &self,
        attrs: ThreadAttributes,
        entry: F,
        argument: A,
    ) -> ExecResult<ThreadHandle>
    where
        F: FnOnce(A) -> R + Send + 'static,
        A: Send + 'static,
        R: Any + Send,
    {
        let id = ThreadIdentity::allocate()?;
        let control = Arc::new(ControlBlock::new(id, attrs.name.clone(), attrs.detached));
        registry().register(control.clone())?;

        let seed = ContextSeed {
            control: control.clone(),
            substrate: self.substrate.clone(),
            cancel_state: attrs.cancel_state,
            cancel_type: attrs.cancel_type,
        };
        let body: FlowBody = Box::new(move || {
            lifecycle::run_entry(seed, move || ExitPayload::new(entry(argument)));
        });

        match self.substrate.spawn(attrs.flow_spec(), body) {
            Ok(flow) => {
                control.attach_flow(flow);
                lifecycle_metrics().record_spawn();
                log::debug!(
                    "spawned thread {:?} ({}) on {}",
                    id,
                    attrs.name().unwrap_or("unnamed"),
                    self.substrate.name()
                );
                Ok(ThreadHandle::from_control(control))
            }
            Err(err) => {
                let _ = registry().unregister(id);
                lifecycle_metrics().record_spawn_failure();
                log::warn!("{} refused to spawn thread {:?}: {}", self.substrate.name(), id, err);
                Err(ExecError::ResourceExhausted)
            }
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("substrate", &self.substrate.name())
            .finish()
    }
}

/// Spawn a joinable thread on the global runtime
///
/// The entry routine's return value becomes the exit payload, unless the
/// thread ends through [`exit_current`](crate::exit_current) or
/// cancellation first.
pub fn spawn<F, A, R>(entry: F, argument: A) -> ExecResult<ThreadHandle>
where
    F: FnOnce(A) -> R + Send + 'static,
    A: Send + 'static,
    R: Any + Send,
{
    Runtime::global().spawn(entry, argument)
}
