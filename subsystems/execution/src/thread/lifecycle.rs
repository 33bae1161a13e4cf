//! # Lifecycle Driver
//!
//! The entry trampoline every spawned thread runs, and the termination and
//! reclamation steps shared by spawned and adopted threads.

use super::context::{self, ContextSeed};
use super::control::ControlBlock;
use super::metrics::lifecycle_metrics;
use super::registry::registry;
use super::LifecycleState;
use crate::exit::ExitPayload;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use strand_substrate::is_termination;

/// Run a thread's entry routine to its end
///
/// Called on the new thread. Whatever way the entry routine ends, the
/// thread leaves here terminated, with its payload published.
pub(crate) fn run_entry<F>(seed: ContextSeed, entry: F)
where
    F: FnOnce() -> ExitPayload,
{
    let control = seed.control.clone();
    let ctx = context::install(seed);
    control.begin_running();
    lifecycle_trace!("thread {:?}: Created -> Running", control.id());

    let (state, payload) = match panic::catch_unwind(AssertUnwindSafe(entry)) {
        Ok(returned) => {
            let leaked = ctx.discard_cleanup();
            match ctx.take_termination() {
                // The entry routine caught the termination unwind and returned anyway.
                Some(record) => {
                    log::warn!(
                        "thread {:?} intercepted its {:?} unwind; discarding its return value",
                        control.id(),
                        record.reason
                    );
                    drop(returned);
                    (record.reason.state(), record.payload)
                }
                None => {
                    if leaked > 0 {
                        log::debug!(
                            "thread {:?} returned with {} cleanup handlers pushed; discarding them",
                            control.id(),
                            leaked
                        );
                    }
                    (LifecycleState::ReturnedNormally, returned)
                }
            }
        }
        Err(unwind) if is_termination(&*unwind) => match ctx.take_termination() {
            Some(record) => (record.reason.state(), record.payload),
            None => {
                log::error!("thread {:?} unwound for termination without a record", control.id());
                (LifecycleState::Panicked, ExitPayload::panicked(unwind))
            }
        },
        Err(unwind) => {
            log::error!("thread {:?} panicked: {}", control.id(), panic_message(&*unwind));
            ctx.begin_termination();
            // Leftover handlers run; a panic inside one is not allowed to escape.
            if panic::catch_unwind(AssertUnwindSafe(|| ctx.unwind_cleanup())).is_err() {
                log::error!("cleanup handler of thread {:?} panicked", control.id());
                ctx.discard_cleanup();
            }
            (LifecycleState::Panicked, ExitPayload::panicked(unwind))
        }
    };

    drop(ctx);
    context::uninstall();
    retire(&control, state, payload);
}

/// Publish the outcome and reclaim the thread if nobody will join it
pub(crate) fn retire(control: &Arc<ControlBlock>, state: LifecycleState, payload: ExitPayload) {
    lifecycle_metrics().record_termination(state);
    log::debug!("thread {:?} terminated: {:?}", control.id(), state);

    if control.publish_termination(state, payload) {
        reclaim(control);
    }
}

/// Release a terminated thread's resources
///
/// Only the first caller for a given thread has any effect.
pub(crate) fn reclaim(control: &Arc<ControlBlock>) -> bool {
    if !control.mark_reclaimed() {
        return false;
    }
    control.broker().discard();
    if registry().unregister(control.id()).is_err() {
        log::warn!("reclaimed thread {:?} was not registered", control.id());
    }
    lifecycle_metrics().record_reclaim();
    lifecycle_trace!("thread {:?} reclaimed", control.id());
    true
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
