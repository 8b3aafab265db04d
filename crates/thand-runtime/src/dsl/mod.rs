//! Workflow DSL model (spec §2 "Workflow DSL model", §6 "Workflow DSL
//! (consumed, not defined here)")
//!
//! The DSL itself - task ordering, control flow, `call`/`with`/`export` -
//! is owned by configuration the core only consumes; this module is the
//! in-memory representation the runner walks, plus an in-memory catalog of
//! named definitions ("rehydrated" by name on every resume, per spec §4.8).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thand_core::ThandError;

/// One task in a workflow definition's task list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDef {
    pub name: String,
    /// `call: <function>` - dispatches through the function registry
    /// (spec §4.6). Mutually exclusive with `kind`.
    #[serde(default)]
    pub call: Option<String>,
    /// A registered task-kind handler name (spec §4.7). Mutually exclusive
    /// with `call`.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub with: Value,
    /// Optional guard expression (`${ … }`); a falsy/null result skips the
    /// task and advances the cursor.
    #[serde(default)]
    pub predicate: Option<Value>,
    /// Named variables bound for this task's expression scope
    /// (`use.variables`), merged over the ambient `$context`/`$task`/`$input`
    /// bindings (spec §4.8, §8 invariant 9).
    #[serde(default)]
    pub use_variables: HashMap<String, Value>,
    #[serde(default)]
    pub export: Option<ExportSpec>,
    /// Explicit next-task name; `None` means "the next task in DSL order"
    /// (spec §4.8: "Ordering: strictly sequential per task").
    #[serde(default)]
    pub next: Option<String>,
}

/// `export.as = ${ $context + . }` style splice back into the workflow
/// context (spec §4.6 `thand.authorize`'s Export).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportSpec {
    #[serde(rename = "as")]
    pub as_expr: Value,
}

/// A named, ordered workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    pub tasks: Vec<TaskDef>,
}

impl WorkflowDefinition {
    pub fn task(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// First task in DSL order, or `None` for an empty definition.
    pub fn first(&self) -> Option<&TaskDef> {
        self.tasks.first()
    }

    /// The task immediately following `name` in DSL order, honoring an
    /// explicit `next` override if present.
    pub fn successor(&self, name: &str) -> Option<&TaskDef> {
        let current = self.task(name)?;
        if let Some(explicit) = &current.next {
            return self.task(explicit);
        }
        let idx = self.tasks.iter().position(|t| t.name == name)?;
        self.tasks.get(idx + 1)
    }
}

/// In-memory catalog of named workflow definitions, resolved by name on
/// every resume (spec §4.8 edge case: "Missing DSL -> rehydrate from the
/// config by name; fail with a clear error if the name is unknown").
#[derive(Debug, Clone, Default)]
pub struct DslRegistry {
    definitions: HashMap<String, WorkflowDefinition>,
}

impl DslRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: WorkflowDefinition) {
        self.definitions.insert(def.name.clone(), def);
    }

    pub fn resolve(&self, name: &str) -> Result<&WorkflowDefinition, ThandError> {
        self.definitions
            .get(name)
            .ok_or_else(|| ThandError::validation(format!("unknown workflow definition: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "elevate".into(),
            tasks: vec![
                TaskDef {
                    name: "notify".into(),
                    call: Some("thand.notify".into()),
                    kind: None,
                    input: Value::Null,
                    with: Value::Null,
                    predicate: None,
                    use_variables: HashMap::new(),
                    export: None,
                    next: None,
                },
                TaskDef {
                    name: "authorize".into(),
                    call: Some("thand.authorize".into()),
                    kind: None,
                    input: Value::Null,
                    with: Value::Null,
                    predicate: None,
                    use_variables: HashMap::new(),
                    export: None,
                    next: None,
                },
            ],
        }
    }

    #[test]
    fn successor_follows_dsl_order_by_default() {
        let def = sample();
        let next = def.successor("notify").unwrap();
        assert_eq!(next.name, "authorize");
    }

    #[test]
    fn successor_honors_explicit_next() {
        let mut def = sample();
        def.tasks[0].next = Some("authorize".to_string());
        def.tasks.push(TaskDef {
            name: "skipped".into(),
            call: None,
            kind: None,
            input: Value::Null,
            with: Value::Null,
            predicate: None,
            use_variables: HashMap::new(),
            export: None,
            next: None,
        });
        let next = def.successor("notify").unwrap();
        assert_eq!(next.name, "authorize");
    }

    #[test]
    fn registry_resolves_by_name_and_errors_on_unknown() {
        let mut registry = DslRegistry::new();
        registry.register(sample());
        assert!(registry.resolve("elevate").is_ok());
        assert!(registry.resolve("no-such-workflow").is_err());
    }

    #[test]
    fn last_task_has_no_successor() {
        let def = sample();
        assert!(def.successor("authorize").is_none());
    }
}
