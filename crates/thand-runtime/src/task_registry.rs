//! Task registry (spec §4.7): a second dispatch table, keyed by task
//! *kind*, for DSL tasks that are not generic function calls.
//!
//! A task-kind handler has the same contract as a [`crate::functions::Function`]
//! (`ValidateRequest`/`Execute`/optional `Export`) - it's dispatched by
//! `kind` instead of by `call` name. The orchestrator uses this registry to
//! synthesize a `$cleanup` task (kind = `thand.revoke`) when no explicit
//! entrypoint is supplied on termination (spec §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use crate::functions::{Function, RevokeFunction};

#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn Function>>,
}

impl TaskRegistry {
    /// Empty registry with no task kinds resolvable. Prefer
    /// [`TaskRegistry::default_registry`] for real use: an empty registry
    /// can't dispatch the synthetic `$cleanup` task (spec §4.9).
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated with the one task kind the orchestrator always needs:
    /// `thand.revoke`, backing the synthetic `$cleanup` task, the same way
    /// [`crate::functions::builtin_registry`] pre-populates the function
    /// registry. This is the constructor every production call site should
    /// use, so there is exactly one place to add task kinds.
    pub fn default_registry() -> Self {
        let mut registry = Self::new();
        registry.register(CLEANUP_TASK_KIND, Arc::new(RevokeFunction));
        registry
    }

    pub fn register(&mut self, kind: &str, handler: Arc<dyn Function>) {
        self.handlers.insert(kind.to_string(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Function>> {
        self.handlers.get(kind).cloned()
    }
}

/// Name of the synthetic cleanup task the orchestrator dispatches on
/// termination when no explicit entrypoint was supplied (spec §4.9).
pub const CLEANUP_TASK_NAME: &str = "$cleanup";
pub const CLEANUP_TASK_KIND: &str = "thand.revoke";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_resolves_by_kind() {
        let mut registry = TaskRegistry::new();
        registry.register(CLEANUP_TASK_KIND, Arc::new(RevokeFunction));
        assert!(registry.get(CLEANUP_TASK_KIND).is_some());
        assert!(registry.get("unregistered").is_none());
    }

    #[test]
    fn default_registry_already_resolves_the_cleanup_task_kind() {
        let registry = TaskRegistry::default_registry();
        assert!(registry.get(CLEANUP_TASK_KIND).is_some());
    }
}
