//! Workflow runner (spec §4.8): the synchronous interpreter for a single
//! `WorkflowTask`.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use thand_core::expr::interpolate;
use thand_core::model::{TaskRecord, WorkflowTask, WorkflowTaskStatus};
use thand_core::ThandError;

use crate::dsl::{DslRegistry, TaskDef};
use crate::functions::{Function, FunctionContext, FunctionRegistry, ProviderLookup};
use crate::task_registry::{TaskRegistry, CLEANUP_TASK_KIND, CLEANUP_TASK_NAME};

/// Handlers signal `waiting`/`suspended`/`faulted` by returning an object
/// containing the reserved `$status` key; its absence means "continue
/// running" (spec §4.8: "Honor status transitions dictated by handlers").
const STATUS_DIRECTIVE_KEY: &str = "$status";

/// Companion to [`STATUS_DIRECTIVE_KEY`]: a `waiting` handler may also carry
/// a duration string under this key, telling the orchestrator how long to
/// sleep before resuming (spec §4.9 timer scheduling).
const RESUME_AFTER_DIRECTIVE_KEY: &str = "$resume_after";

/// Outcome of a single [`WorkflowRunner::step`] call.
pub enum StepOutcome {
    /// A task ran to completion and the cursor advanced; call `step` again.
    Continued,
    /// The task list paused (waiting/suspended). Carries a resume hint if
    /// the handler provided one (e.g. a wait duration).
    Paused { resume_after: Option<String> },
    /// No further task; the workflow is done.
    Completed,
    /// A task faulted; the workflow is terminal.
    Faulted,
}

/// Interprets one [`WorkflowTask`] against its named [`crate::dsl::WorkflowDefinition`],
/// one task dispatch at a time.
pub struct WorkflowRunner<'a> {
    pub dsl: &'a DslRegistry,
    pub functions: &'a FunctionRegistry,
    pub tasks: &'a TaskRegistry,
    pub providers: &'a dyn ProviderLookup,
}

impl<'a> WorkflowRunner<'a> {
    pub fn new(
        dsl: &'a DslRegistry,
        functions: &'a FunctionRegistry,
        tasks: &'a TaskRegistry,
        providers: &'a dyn ProviderLookup,
    ) -> Self {
        Self { dsl, functions, tasks, providers }
    }

    /// Runs `task` forward from its current cursor until a pause point.
    /// Never errors: every failure mode is recorded on the task itself as a
    /// `faulted` status plus an error record (spec §4.8).
    pub async fn run(&self, task: &mut WorkflowTask) -> Result<(), ThandError> {
        loop {
            match self.step(task).await {
                StepOutcome::Continued => continue,
                StepOutcome::Paused { .. } | StepOutcome::Completed | StepOutcome::Faulted => {
                    return Ok(())
                }
            }
        }
    }

    /// Dispatches exactly one task at the current cursor and advances or
    /// pauses the workflow accordingly. Intended to be driven by the
    /// durable orchestrator one activity at a time (spec §4.9).
    pub async fn step(&self, task: &mut WorkflowTask) -> StepOutcome {
        let dsl = match self.dsl.resolve(&task.dsl_name) {
            Ok(dsl) => dsl,
            Err(err) => {
                fault(task, &err, None);
                return StepOutcome::Faulted;
            }
        };

        if task.status == WorkflowTaskStatus::Pending {
            task.status = WorkflowTaskStatus::Running;
        }
        if task.status.is_terminal() {
            return match task.status {
                WorkflowTaskStatus::Completed => StepOutcome::Completed,
                _ => StepOutcome::Faulted,
            };
        }

        let current_name = match &task.state.entrypoint {
            Some(name) => name.clone(),
            None => match dsl.first() {
                Some(first) => first.name.clone(),
                None => {
                    task.status = WorkflowTaskStatus::Completed;
                    return StepOutcome::Completed;
                }
            },
        };

        let task_def = match dsl.task(&current_name).cloned() {
            Some(task_def) => task_def,
            None if current_name == CLEANUP_TASK_NAME => cleanup_task_def(),
            None => {
                let err = ThandError::validation(format!(
                    "workflow {:?} has no task named {current_name:?}",
                    dsl.name
                ));
                fault(task, &err, Some(&current_name));
                return StepOutcome::Faulted;
            }
        };

        match self.dispatch_one(task, dsl.name.as_str(), &task_def).await {
            DispatchOutcome::Advance => {
                task.state.entrypoint = dsl.successor(&current_name).map(|t| t.name.clone());
                if task.state.entrypoint.is_none() {
                    task.status = WorkflowTaskStatus::Completed;
                    StepOutcome::Completed
                } else {
                    StepOutcome::Continued
                }
            }
            DispatchOutcome::Skip => {
                task.state.entrypoint = dsl.successor(&current_name).map(|t| t.name.clone());
                if task.state.entrypoint.is_none() {
                    task.status = WorkflowTaskStatus::Completed;
                    StepOutcome::Completed
                } else {
                    StepOutcome::Continued
                }
            }
            DispatchOutcome::Pause { status, resume_after } => {
                task.status = status;
                task.state.entrypoint = dsl.successor(&current_name).map(|t| t.name.clone());
                StepOutcome::Paused { resume_after }
            }
            DispatchOutcome::Fault => StepOutcome::Faulted,
        }
    }

    async fn dispatch_one(
        &self,
        task: &mut WorkflowTask,
        workflow_name: &str,
        task_def: &TaskDef,
    ) -> DispatchOutcome {
        let doc = task.context_document();

        let input_value = match interpolate(&task_def.input, &doc, &HashMap::new()) {
            Ok(v) => v,
            Err(err) => {
                fault(task, &err, Some(&task_def.name));
                return DispatchOutcome::Fault;
            }
        };

        let mut variables = HashMap::new();
        variables.insert("context".to_string(), doc.clone());
        variables.insert(
            "workflow".to_string(),
            serde_json::json!({"name": workflow_name}),
        );
        variables.insert(
            "task".to_string(),
            serde_json::json!({"name": task_def.name}),
        );
        variables.insert("input".to_string(), input_value.clone());

        for (key, raw) in &task_def.use_variables {
            match interpolate(raw, &doc, &variables) {
                Ok(v) => {
                    variables.insert(key.clone(), v);
                }
                Err(err) => {
                    fault(task, &err, Some(&task_def.name));
                    return DispatchOutcome::Fault;
                }
            }
        }

        if let Some(predicate) = &task_def.predicate {
            match interpolate(predicate, &doc, &variables) {
                Ok(result) => {
                    if is_falsy(&result) {
                        return DispatchOutcome::Skip;
                    }
                }
                Err(err) => {
                    fault(task, &err, Some(&task_def.name));
                    return DispatchOutcome::Fault;
                }
            }
        }

        let with_value = match interpolate(&task_def.with, &doc, &variables) {
            Ok(v) => v,
            Err(err) => {
                fault(task, &err, Some(&task_def.name));
                return DispatchOutcome::Fault;
            }
        };

        let handler: std::sync::Arc<dyn Function> = if let Some(call) = &task_def.call {
            match self.functions.get(call) {
                Some(h) => h,
                None => {
                    let err = ThandError::validation(format!("unknown function: {call:?}"));
                    fault(task, &err, Some(&task_def.name));
                    return DispatchOutcome::Fault;
                }
            }
        } else if let Some(kind) = &task_def.kind {
            match self.tasks.get(kind) {
                Some(h) => h,
                None => {
                    let err = ThandError::validation(format!("unknown task kind: {kind:?}"));
                    fault(task, &err, Some(&task_def.name));
                    return DispatchOutcome::Fault;
                }
            }
        } else {
            let err = ThandError::validation(format!(
                "task {:?} declares neither `call` nor `kind`",
                task_def.name
            ));
            fault(task, &err, Some(&task_def.name));
            return DispatchOutcome::Fault;
        };

        if let Err(err) = handler.validate_request(&with_value) {
            fault(task, &err, Some(&task_def.name));
            return DispatchOutcome::Fault;
        }

        let started_at = Utc::now();
        let function_ctx = FunctionContext {
            context: &doc,
            variables: &variables,
            request: &task.request,
            providers: self.providers,
            now: started_at,
        };

        let mut output = match handler.execute(&function_ctx, &with_value).await {
            Ok(output) => output,
            Err(err) => {
                record(task, &task_def.name, input_value, Value::Null, started_at, None);
                fault(task, &err, Some(&task_def.name));
                return DispatchOutcome::Fault;
            }
        };

        let directive = extract_status_directive(&mut output);
        let resume_after = extract_resume_after(&mut output);

        record(task, &task_def.name, input_value, output.clone(), started_at, None);

        let export_expr = task_def
            .export
            .as_ref()
            .map(|e| e.as_expr.clone())
            .or_else(|| handler.default_export());

        if let Some(expr) = export_expr {
            match interpolate(&expr, &output, &variables) {
                Ok(Value::Object(map)) => task.state.context = map,
                Ok(_) => {}
                Err(err) => {
                    fault(task, &err, Some(&task_def.name));
                    return DispatchOutcome::Fault;
                }
            }
        }

        if task_def.call.as_deref() == Some("thand.authorize") {
            task.state.approved = true;
        }

        match directive.as_deref() {
            Some("waiting") => DispatchOutcome::Pause {
                status: WorkflowTaskStatus::Waiting,
                resume_after,
            },
            Some("suspended") => DispatchOutcome::Pause {
                status: WorkflowTaskStatus::Suspended,
                resume_after,
            },
            Some("faulted") => {
                let err = ThandError::validation("handler requested faulted status");
                fault(task, &err, Some(&task_def.name));
                DispatchOutcome::Fault
            }
            _ => DispatchOutcome::Advance,
        }
    }
}

enum DispatchOutcome {
    Advance,
    Skip,
    Pause { status: WorkflowTaskStatus, resume_after: Option<String> },
    Fault,
}

fn extract_status_directive(output: &mut Value) -> Option<String> {
    if let Value::Object(map) = output {
        if let Some(Value::String(status)) = map.remove(STATUS_DIRECTIVE_KEY) {
            return Some(status);
        }
    }
    None
}

fn extract_resume_after(output: &mut Value) -> Option<String> {
    if let Value::Object(map) = output {
        if let Some(Value::String(duration)) = map.remove(RESUME_AFTER_DIRECTIVE_KEY) {
            return Some(duration);
        }
    }
    None
}

fn is_falsy(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(false))
}

/// The workflow's authored task list never names `$cleanup` directly - it's
/// forced onto the cursor by the orchestrator's `terminate` signal handling
/// (spec §4.9's cleanup guarantee). Synthesize the task definition here
/// rather than requiring every DSL author to declare it explicitly.
fn cleanup_task_def() -> TaskDef {
    TaskDef {
        name: CLEANUP_TASK_NAME.to_string(),
        call: None,
        kind: Some(CLEANUP_TASK_KIND.to_string()),
        input: Value::Null,
        with: Value::Null,
        predicate: None,
        use_variables: HashMap::new(),
        export: None,
        next: None,
    }
}

fn record(
    task: &mut WorkflowTask,
    task_name: &str,
    input: Value,
    output: Value,
    started_at: chrono::DateTime<Utc>,
    error: Option<(String, String)>,
) {
    let ended_at = Utc::now();
    let (error_kind, error_message) = match error {
        Some((kind, message)) => (Some(kind), Some(message)),
        None => (None, None),
    };
    task.state.records.insert(
        task_name.to_string(),
        TaskRecord {
            input,
            output,
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            error_kind,
            error_message,
        },
    );
}

fn fault(task: &mut WorkflowTask, err: &ThandError, task_name: Option<&str>) {
    task.status = WorkflowTaskStatus::Faulted;
    if let Some(name) = task_name {
        let entry = task.state.records.entry(name.to_string()).or_default();
        entry.error_kind = Some(err.kind.to_string());
        entry.error_message = Some(err.message.clone());
        entry.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{ExportSpec, WorkflowDefinition};
    use crate::functions::builtin_registry;
    use std::sync::Arc;
    use thand_core::model::PermissionSet;
    use thand_core::provider::Provider;
    use thand_core::{ElevateRequest, Role};
    use uuid::Uuid;

    fn request() -> ElevateRequest {
        ElevateRequest {
            reason: "access to billing".into(),
            duration: "PT1H".into(),
            providers: vec!["aws-prod".into()],
            identities: vec!["u@example.com".into()],
            authenticator: "oauth2.google".into(),
            role: Role {
                name: "billing-reader".into(),
                description: String::new(),
                providers: vec!["aws-prod".into()],
                inherits: vec![],
                permissions: PermissionSet::default(),
                resources: PermissionSet::default(),
                authenticators: vec![],
                workflows: vec!["elevate".into()],
                enabled: true,
            },
            workflow: "elevate".into(),
            session: None,
        }
    }

    fn empty_providers(_: &str) -> Option<Arc<dyn Provider>> {
        None
    }

    fn task_def(name: &str, call: &str, with: Value) -> TaskDef {
        TaskDef {
            name: name.into(),
            call: Some(call.into()),
            kind: None,
            input: Value::Null,
            with,
            predicate: None,
            use_variables: HashMap::new(),
            export: None,
            next: None,
        }
    }

    #[tokio::test]
    async fn empty_definition_completes_immediately() {
        let mut dsl = DslRegistry::new();
        dsl.register(WorkflowDefinition { name: "elevate".into(), tasks: vec![] });
        let functions = builtin_registry();
        let tasks = TaskRegistry::new();
        let runner = WorkflowRunner::new(&dsl, &functions, &tasks, &empty_providers);

        let mut task = WorkflowTask::new(Uuid::new_v4(), "elevate", request());
        runner.run(&mut task).await.unwrap();
        assert_eq!(task.status, WorkflowTaskStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_workflow_name_faults() {
        let dsl = DslRegistry::new();
        let functions = builtin_registry();
        let tasks = TaskRegistry::new();
        let runner = WorkflowRunner::new(&dsl, &functions, &tasks, &empty_providers);

        let mut task = WorkflowTask::new(Uuid::new_v4(), "no-such-workflow", request());
        runner.run(&mut task).await.unwrap();
        assert_eq!(task.status, WorkflowTaskStatus::Faulted);
    }

    #[tokio::test]
    async fn predicate_false_skips_task() {
        let mut def = task_def("skippable", "thand.notify", Value::Null);
        def.predicate = Some(serde_json::json!("${ .never }"));
        let mut dsl = DslRegistry::new();
        dsl.register(WorkflowDefinition { name: "elevate".into(), tasks: vec![def] });
        let functions = builtin_registry();
        let tasks = TaskRegistry::new();
        let runner = WorkflowRunner::new(&dsl, &functions, &tasks, &empty_providers);

        let mut task = WorkflowTask::new(Uuid::new_v4(), "elevate", request());
        runner.run(&mut task).await.unwrap();
        assert_eq!(task.status, WorkflowTaskStatus::Completed);
        assert!(!task.state.records.contains_key("skippable"));
    }

    #[tokio::test]
    async fn waiting_status_pauses_and_advances_cursor_for_next_resume() {
        let wait = task_def("wait", "thand.wait", serde_json::json!({"duration": "PT1H"}));
        let after_wait = task_def(
            "after-wait",
            "thand.notify",
            serde_json::json!({"provider": "aws-prod", "to": "a@x.com", "subject": "s", "body": "b"}),
        );
        let mut dsl = DslRegistry::new();
        dsl.register(WorkflowDefinition { name: "elevate".into(), tasks: vec![wait, after_wait] });
        let functions = builtin_registry();
        let tasks = TaskRegistry::new();
        let runner = WorkflowRunner::new(&dsl, &functions, &tasks, &empty_providers);

        let mut task = WorkflowTask::new(Uuid::new_v4(), "elevate", request());
        runner.run(&mut task).await.unwrap();
        assert_eq!(task.status, WorkflowTaskStatus::Waiting);
        assert_eq!(task.state.entrypoint.as_deref(), Some("after-wait"));
    }

    #[tokio::test]
    async fn step_reports_resume_after_hint_from_wait() {
        let wait = task_def("wait", "thand.wait", serde_json::json!({"duration": "PT1H"}));
        let mut dsl = DslRegistry::new();
        dsl.register(WorkflowDefinition { name: "elevate".into(), tasks: vec![wait] });
        let functions = builtin_registry();
        let tasks = TaskRegistry::new();
        let runner = WorkflowRunner::new(&dsl, &functions, &tasks, &empty_providers);

        let mut task = WorkflowTask::new(Uuid::new_v4(), "elevate", request());
        match runner.step(&mut task).await {
            StepOutcome::Paused { resume_after } => assert_eq!(resume_after.as_deref(), Some("PT1H")),
            _ => panic!("expected a pause"),
        }
    }

    #[test]
    fn export_spec_type_is_constructible() {
        let _ = ExportSpec { as_expr: Value::Null };
    }

    #[tokio::test]
    async fn forced_cleanup_entrypoint_dispatches_the_revoke_task_kind() {
        let mut dsl = DslRegistry::new();
        dsl.register(WorkflowDefinition { name: "elevate".into(), tasks: vec![] });
        let functions = builtin_registry();
        let mut tasks = TaskRegistry::new();
        tasks.register(CLEANUP_TASK_KIND, Arc::new(crate::functions::RevokeFunction));
        let runner = WorkflowRunner::new(&dsl, &functions, &tasks, &empty_providers);

        let mut task = WorkflowTask::new(Uuid::new_v4(), "elevate", request());
        task.state.entrypoint = Some(CLEANUP_TASK_NAME.to_string());
        // no provider is registered, so the revoke call itself fails, but the
        // dispatch must reach the handler rather than faulting on an unknown
        // task name first.
        runner.run(&mut task).await.unwrap();
        assert_eq!(task.status, WorkflowTaskStatus::Faulted);
        let record = task.state.records.get(CLEANUP_TASK_NAME).unwrap();
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("elevate request has no providers to revoke against")
            || record.error_message.as_deref().unwrap().contains("provider does not exist"));
    }
}
