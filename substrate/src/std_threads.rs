//! # Standard Library Substrate
//!
//! Flows of control backed by `std::thread`.

use crate::{is_termination, ExecutionSubstrate, Flow, FlowBody, FlowSpec, SubstrateError, SubstrateResult};
use core::sync::atomic::{AtomicU64, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Substrate running every flow on its own OS thread
#[derive(Debug, Default)]
pub struct StdSubstrate {
    /// Flows created so far
    spawned: AtomicU64,
}

impl StdSubstrate {
    /// Create a new substrate
    pub const fn new() -> Self {
        Self {
            spawned: AtomicU64::new(0),
        }
    }

    /// Number of flows created through this substrate
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl ExecutionSubstrate for StdSubstrate {
    fn name(&self) -> &'static str {
        "std-threads"
    }

    fn spawn(&self, spec: FlowSpec, body: FlowBody) -> SubstrateResult<Box<dyn Flow>> {
        let mut builder = thread::Builder::new();
        if let Some(name) = spec.name {
            builder = builder.name(name);
        }
        if let Some(size) = spec.stack_size {
            builder = builder.stack_size(size);
        }

        let handle = builder
            .spawn(move || {
                // The termination marker means the flow ended itself on purpose.
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                    if !is_termination(&*payload) {
                        panic::resume_unwind(payload);
                    }
                }
            })
            .map_err(|err| {
                log::warn!("std substrate: thread creation failed: {}", err);
                SubstrateError::Exhausted
            })?;

        self.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(StdFlow { handle }))
    }
}

/// A flow running on an OS thread
#[derive(Debug)]
struct StdFlow {
    handle: thread::JoinHandle<()>,
}

impl Flow for StdFlow {
    fn join(self: Box<Self>) -> SubstrateResult<()> {
        self.handle.join().map_err(|_| SubstrateError::Aborted)
    }

    fn detach(self: Box<Self>) {
        // Dropping a JoinHandle detaches the OS thread.
        drop(self.handle);
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
