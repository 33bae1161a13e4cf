//! # Thread Registry
//!
//! Every thread from registration until it is reclaimed.

use super::control::ControlBlock;
use super::{LifecycleState, ThreadHandle};
use crate::{ExecError, ExecResult, ThreadIdentity};
use hashbrown::HashMap;
use spin::RwLock;
use std::sync::Arc;

/// Thread registry
#[derive(Debug)]
pub struct ThreadRegistry {
    /// Live threads by identity
    threads: RwLock<HashMap<ThreadIdentity, Arc<ControlBlock>>>,
}

impl ThreadRegistry {
    /// Create a new registry
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
        }
    }

    /// Register a thread
    pub(crate) fn register(&self, control: Arc<ControlBlock>) -> ExecResult<()> {
        let id = control.id();

        let mut threads = self.threads.write();
        if threads.contains_key(&id) {
            return Err(ExecError::InvalidOperation);
        }
        threads.insert(id, control);

        Ok(())
    }

    /// Unregister a thread
    pub(crate) fn unregister(&self, id: ThreadIdentity) -> ExecResult<Arc<ControlBlock>> {
        self.threads.write().remove(&id).ok_or(ExecError::NotFound)
    }

    /// Get a handle to a live thread
    pub fn get(&self, id: ThreadIdentity) -> Option<ThreadHandle> {
        self.threads.read().get(&id).cloned().map(ThreadHandle::from_control)
    }

    /// Check if a thread is still registered
    pub fn contains(&self, id: ThreadIdentity) -> bool {
        self.threads.read().contains_key(&id)
    }

    /// Get thread count
    pub fn count(&self) -> usize {
        self.threads.read().len()
    }

    /// Get the number of threads in a state
    pub fn count_in_state(&self, state: LifecycleState) -> usize {
        self.threads.read().values().filter(|t| t.state() == state).count()
    }

    /// Iterate over all live threads
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ThreadHandle),
    {
        let handles: Vec<ThreadHandle> = self
            .threads
            .read()
            .values()
            .cloned()
            .map(ThreadHandle::from_control)
            .collect();

        // Called without the lock held so `f` may spawn or join.
        for handle in &handles {
            f(handle);
        }
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global thread registry
static REGISTRY: spin::Lazy<ThreadRegistry> = spin::Lazy::new(ThreadRegistry::new);

/// Get the thread registry
pub fn registry() -> &'static ThreadRegistry {
    &REGISTRY
}

/// Get a handle to a live thread by identity
pub fn lookup(id: ThreadIdentity) -> ExecResult<ThreadHandle> {
    registry().get(id).ok_or(ExecError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> Arc<ControlBlock> {
        Arc::new(ControlBlock::new(ThreadIdentity::allocate().unwrap(), None, false))
    }

    #[test]
    fn test_register_unregister() {
        let registry = ThreadRegistry::new();
        let control = control();
        let id = control.id();

        registry.register(control.clone()).unwrap();
        assert!(registry.contains(id));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.register(control), Err(ExecError::InvalidOperation));

        assert!(registry.unregister(id).is_ok());
        assert!(!registry.contains(id));
        assert_eq!(registry.unregister(id).unwrap_err(), ExecError::NotFound);
    }

    #[test]
    fn test_count_in_state() {
        let registry = ThreadRegistry::new();
        let created = control();
        let running = control();
        running.begin_running();

        registry.register(created).unwrap();
        registry.register(running.clone()).unwrap();

        assert_eq!(registry.count_in_state(LifecycleState::Created), 1);
        assert_eq!(registry.count_in_state(LifecycleState::Running), 1);
        assert_eq!(registry.get(running.id()).map(|h| h.identity()), Some(running.id()));

        let mut seen = 0;
        registry.for_each(|_| seen += 1);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_debug_lists_threads() {
        let registry = ThreadRegistry::new();
        registry.register(control()).unwrap();
        let text = format!("{:?}", registry);
        assert!(text.starts_with("ThreadRegistry"));
        assert!(text.contains("ControlBlock"));
    }

    #[test]
    fn test_lookup_unknown_identity() {
        let id = ThreadIdentity::allocate().unwrap();
        assert_eq!(lookup(id).unwrap_err(), ExecError::NotFound);
    }
}
