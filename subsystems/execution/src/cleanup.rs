//! # Cleanup Handlers
//!
//! Per-thread LIFO stack of cleanup handlers.
//!
//! [`push`] registers a handler and returns a [`CleanupGuard`] for it. The
//! guard is the matching pop: [`CleanupGuard::pop`] removes the handler and
//! optionally runs it; letting the guard fall out of scope removes it
//! without running it.
//!
//! Explicit exit and cancellation run every handler still on the stack, most
//! recent first. A plain return from the thread's entry routine does not:
//! handlers left on the stack at that point (because their guards were
//! leaked) are discarded unrun.

use crate::cancel;
use crate::thread::context;
use core::fmt;
use core::marker::PhantomData;

/// A registered cleanup handler with its captured argument
pub struct CleanupEntry {
    handler: Box<dyn FnOnce()>,
}

impl CleanupEntry {
    /// Wrap a handler
    pub fn new(handler: impl FnOnce() + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Invoke the handler, consuming it
    pub fn run(self) {
        (self.handler)()
    }
}

impl fmt::Debug for CleanupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CleanupEntry(..)")
    }
}

/// Ordered cleanup handlers, top = most recently pushed
#[derive(Debug, Default)]
pub struct CleanupStack {
    entries: Vec<CleanupEntry>,
}

impl CleanupStack {
    /// Create an empty stack
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Push a handler; returns the depth it was stored at
    pub fn push(&mut self, entry: CleanupEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Remove the top handler
    pub fn pop(&mut self) -> Option<CleanupEntry> {
        self.entries.pop()
    }

    /// Remove the handler stored at `depth`
    ///
    /// Handlers pushed above it are discarded unrun. Returns `None` if the
    /// stack no longer reaches `depth`.
    pub fn pop_at(&mut self, depth: usize) -> Option<CleanupEntry> {
        if self.entries.len() <= depth {
            return None;
        }
        let above = self.entries.len() - depth - 1;
        if above > 0 {
            log::warn!(
                "cleanup handler popped out of order; discarding {} newer handlers",
                above
            );
            self.entries.truncate(depth + 1);
        }
        self.entries.pop()
    }

    /// Drop every handler without running it
    pub fn discard_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of pushed handlers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scope token for one pushed cleanup handler
///
/// Bound to the thread that pushed it.
#[must_use = "dropping the guard pops the handler without running it"]
pub struct CleanupGuard {
    depth: usize,
    released: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl CleanupGuard {
    /// Pop the handler, running it if `execute` is set
    pub fn pop(mut self, execute: bool) {
        self.release(execute);
        cancel::deliver_asynchronous();
    }

    /// Depth of the handler on the stack
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn release(&mut self, execute: bool) {
        if core::mem::replace(&mut self.released, true) {
            return;
        }
        // The stack may already be gone if the thread is tearing down.
        let entry = context::try_with_current(|ctx| ctx.pop_cleanup_at(self.depth)).flatten();
        if let Some(entry) = entry {
            if execute {
                entry.run();
            }
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        // A panic unwinding through the scope is abnormal termination.
        self.release(std::thread::panicking());
    }
}

impl fmt::Debug for CleanupGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupGuard")
            .field("depth", &self.depth)
            .field("released", &self.released)
            .finish()
    }
}

/// Push a cleanup handler onto the calling thread's stack
pub fn push<F>(handler: F) -> CleanupGuard
where
    F: FnOnce() + 'static,
{
    let depth = context::current().push_cleanup(CleanupEntry::new(handler));
    lifecycle_trace!("pushed cleanup handler at depth {}", depth);
    cancel::deliver_asynchronous();
    CleanupGuard {
        depth,
        released: false,
        _thread_bound: PhantomData,
    }
}

/// Push a handler together with the argument it is called with
pub fn push_with<A, F>(handler: F, argument: A) -> CleanupGuard
where
    A: 'static,
    F: FnOnce(A) + 'static,
{
    push(move || handler(argument))
}

/// Number of handlers on the calling thread's stack
pub fn depth() -> usize {
    context::current().cleanup_depth()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> CleanupEntry) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| {
            let sink = sink.clone();
            CleanupEntry::new(move || sink.borrow_mut().push(label))
        };
        (log, make)
    }

    #[test]
    fn test_stack_pops_in_reverse_order() {
        let (log, entry) = recorder();
        let mut stack = CleanupStack::new();
        stack.push(entry("A"));
        stack.push(entry("B"));
        stack.push(entry("C"));

        while let Some(handler) = stack.pop() {
            handler.run();
        }
        assert_eq!(*log.borrow(), vec!["C", "B", "A"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_discard_all_runs_nothing() {
        let (log, entry) = recorder();
        let mut stack = CleanupStack::new();
        stack.push(entry("A"));
        stack.push(entry("B"));

        assert_eq!(stack.discard_all(), 2);
        assert!(log.borrow().is_empty());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_at_discards_newer_entries() {
        let (log, entry) = recorder();
        let mut stack = CleanupStack::new();
        let a = stack.push(entry("A"));
        stack.push(entry("B"));
        stack.push(entry("C"));

        stack.pop_at(a).unwrap().run();
        assert_eq!(*log.borrow(), vec!["A"]);
        assert!(stack.is_empty());
        assert!(stack.pop_at(a).is_none());
    }

    #[test]
    fn test_guard_pop_executes_on_request() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let base = depth();

        let sink = log.clone();
        let guard = push(move || sink.borrow_mut().push("ran"));
        assert_eq!(depth(), base + 1);
        guard.pop(true);

        assert_eq!(*log.borrow(), vec!["ran"]);
        assert_eq!(depth(), base);
    }

    #[test]
    fn test_guard_pop_without_execute_discards() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let base = depth();

        let sink = log.clone();
        push(move || sink.borrow_mut().push("ran")).pop(false);

        assert!(log.borrow().is_empty());
        assert_eq!(depth(), base);
    }

    #[test]
    fn test_guard_scope_exit_discards() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let base = depth();
        {
            let sink = log.clone();
            let _guard = push(move || sink.borrow_mut().push("ran"));
            assert_eq!(depth(), base + 1);
        }
        assert!(log.borrow().is_empty());
        assert_eq!(depth(), base);
    }

    #[test]
    fn test_push_with_passes_argument() {
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        push_with(move |value: u32| *sink.borrow_mut() = value, 7).pop(true);
        assert_eq!(*seen.borrow(), 7);
    }

    #[test]
    fn test_guard_runs_handler_when_panicking() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = push(move || sink.borrow_mut().push("unwound"));
            panic!("abnormal termination");
        }));

        assert!(result.is_err());
        assert_eq!(*log.borrow(), vec!["unwound"]);
    }
}
