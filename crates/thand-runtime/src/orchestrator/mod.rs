//! Durable orchestrator binding (spec §4.9): wraps one [`WorkflowTask`] as a
//! `thand_durable::Workflow`, driving the runner one task at a time via a
//! single activity type so every step is individually retried, persisted,
//! and replayable.
//!
//! The workflow state machine itself stays synchronous and side-effect
//! free, per `thand_durable`'s determinism requirement - all provider calls
//! happen inside [`RunStepActivity`], which workers execute out-of-line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thand_core::model::{WorkflowTask, WorkflowTaskStatus};
use thand_core::registry::ProviderRegistry;
use thand_durable::activity::{Activity, ActivityContext, ActivityError};
use thand_durable::workflow::{
    ActivityOptions, Workflow, WorkflowAction, WorkflowError, WorkflowSignal,
};

use crate::functions::{FunctionRegistry, ProviderLookup};
use crate::runner::{StepOutcome, WorkflowRunner};
use crate::task_registry::{TaskRegistry, CLEANUP_TASK_KIND, CLEANUP_TASK_NAME};

impl ProviderLookup for ProviderRegistry {
    fn lookup(&self, name_or_kind: &str) -> Option<std::sync::Arc<dyn thand_core::provider::Provider>> {
        self.get(name_or_kind)
    }
}

/// Input to start an elevation workflow: just enough to rehydrate a fresh
/// [`WorkflowTask`] (spec §4.8 "Missing task state -> fresh init").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevationWorkflowInput {
    pub task: WorkflowTask,
}

/// `RunStep` activity input/output: the task snapshot going in, the updated
/// snapshot plus a resume hint coming out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStepInput {
    pub task: WorkflowTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStepOutput {
    pub task: WorkflowTask,
    pub continued: bool,
    pub resume_after: Option<String>,
}

pub const RUN_STEP_ACTIVITY_TYPE: &str = "thand.run_step";

/// Executes one runner step per invocation. Holds the registries the runner
/// needs; these are process-wide and cheap to clone (`Arc`-backed).
pub struct RunStepActivity {
    pub dsl: crate::dsl::DslRegistry,
    pub functions: FunctionRegistry,
    pub tasks: TaskRegistry,
    pub providers: ProviderRegistry,
}

#[async_trait::async_trait]
impl Activity for RunStepActivity {
    const TYPE: &'static str = RUN_STEP_ACTIVITY_TYPE;
    type Input = RunStepInput;
    type Output = RunStepOutput;

    async fn execute(
        &self,
        _ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError> {
        let mut task = input.task;
        let runner = WorkflowRunner::new(&self.dsl, &self.functions, &self.tasks, &self.providers);
        let outcome = runner.step(&mut task).await;
        let (continued, resume_after) = match outcome {
            StepOutcome::Continued => (true, None),
            StepOutcome::Paused { resume_after } => (false, resume_after),
            StepOutcome::Completed | StepOutcome::Faulted => (false, None),
        };
        Ok(RunStepOutput { task, continued, resume_after })
    }
}

/// Drives a single [`WorkflowTask`] to completion as a durable,
/// signal-driven state machine (spec §4.9).
///
/// Query surface (handled by callers reading [`Self::task`] directly since
/// `thand_durable` workflows are plain Rust values replayed in-process):
/// `isApproved` is `task.state.approved`; `getWorkflowTask` is `task` itself.
pub struct ExecuteElevationWorkflow {
    task: WorkflowTask,
    step: u32,
    output: Option<WorkflowTask>,
    error: Option<WorkflowError>,
}

impl ExecuteElevationWorkflow {
    pub fn is_approved(&self) -> bool {
        self.task.state.approved
    }

    pub fn task(&self) -> &WorkflowTask {
        &self.task
    }

    fn schedule_next_step(&mut self) -> Vec<WorkflowAction> {
        self.step += 1;
        vec![WorkflowAction::ScheduleActivity {
            activity_id: format!("step-{}", self.step),
            activity_type: RUN_STEP_ACTIVITY_TYPE.into(),
            input: serde_json::to_value(RunStepInput { task: self.task.clone() })
                .unwrap_or(Value::Null),
            options: ActivityOptions::default(),
        }]
    }

    /// Forces the cursor to the synthetic `$cleanup` task (kind
    /// `thand.revoke`) so termination always attempts a best-effort revoke,
    /// even with no prior authorization recorded (spec §4.9 "cleanup
    /// guarantee", §8 invariant 7).
    fn force_cleanup(&mut self) {
        self.task.state.entrypoint = Some(CLEANUP_TASK_NAME.to_string());
        let _ = CLEANUP_TASK_KIND;
    }
}

impl Workflow for ExecuteElevationWorkflow {
    const TYPE: &'static str = "thand.execute_elevation";
    type Input = ElevationWorkflowInput;
    type Output = WorkflowTask;

    fn new(input: Self::Input) -> Self {
        Self { task: input.task, step: 0, output: None, error: None }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        if self.task.status.is_terminal() {
            return self.finish();
        }
        self.schedule_next_step()
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: Value) -> Vec<WorkflowAction> {
        if !activity_id.starts_with("step-") {
            return vec![WorkflowAction::None];
        }
        let Ok(output) = serde_json::from_value::<RunStepOutput>(result) else {
            self.error = Some(WorkflowError::new("malformed run-step activity result"));
            return vec![WorkflowAction::FailWorkflow {
                error: self.error.clone().unwrap(),
            }];
        };
        self.task = output.task;

        if output.continued {
            return self.schedule_next_step();
        }
        match self.task.status {
            WorkflowTaskStatus::Completed => self.finish(),
            WorkflowTaskStatus::Faulted => {
                let message = self
                    .task
                    .state
                    .records
                    .values()
                    .filter_map(|r| r.error_message.clone())
                    .last()
                    .unwrap_or_else(|| "workflow task faulted".to_string());
                self.error = Some(WorkflowError::new(message));
                // A fault after `thand.authorize` already granted a role must
                // still revoke it (spec §4.9 cleanup guarantee, §8 invariant
                // 7) - same force_cleanup/reschedule path `terminate` takes
                // after approval. Skip it if the fault came from the cleanup
                // dispatch itself, or this would loop forever.
                if self.task.state.approved
                    && self.task.state.entrypoint.as_deref() != Some(CLEANUP_TASK_NAME)
                {
                    self.task.status = WorkflowTaskStatus::Running;
                    self.force_cleanup();
                    self.schedule_next_step()
                } else {
                    vec![WorkflowAction::FailWorkflow { error: self.error.clone().unwrap() }]
                }
            }
            WorkflowTaskStatus::Waiting | WorkflowTaskStatus::Suspended => {
                if let Some(duration) = output.resume_after.as_deref() {
                    if let Ok(d) = thand_core::duration::parse_duration(duration) {
                        return vec![WorkflowAction::timer(format!("wait-{}", self.step), d)];
                    }
                }
                vec![WorkflowAction::None]
            }
            _ => vec![WorkflowAction::None],
        }
    }

    fn on_activity_failed(&mut self, _activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        let err = WorkflowError::new(error.message.clone());
        self.error = Some(err.clone());
        vec![WorkflowAction::FailWorkflow { error: err }]
    }

    fn on_timer_fired(&mut self, _timer_id: &str) -> Vec<WorkflowAction> {
        self.schedule_next_step()
    }

    fn on_signal(&mut self, signal: &WorkflowSignal) -> Vec<WorkflowAction> {
        match signal.signal_type.as_str() {
            "resume" => {
                if self.task.status.is_terminal() {
                    return vec![WorkflowAction::None];
                }
                self.task.status = WorkflowTaskStatus::Running;
                self.schedule_next_step()
            }
            "terminate" => {
                if self.task.status.is_terminal() {
                    return vec![WorkflowAction::None];
                }
                if self.task.state.approved {
                    self.task.status = WorkflowTaskStatus::Running;
                    self.force_cleanup();
                    self.schedule_next_step()
                } else {
                    self.task.status = WorkflowTaskStatus::Cancelled;
                    self.finish()
                }
            }
            _ => vec![WorkflowAction::None],
        }
    }

    fn is_completed(&self) -> bool {
        self.task.status.is_terminal()
    }

    fn result(&self) -> Option<Self::Output> {
        self.output.clone()
    }

    fn error(&self) -> Option<WorkflowError> {
        self.error.clone()
    }
}

impl ExecuteElevationWorkflow {
    fn finish(&mut self) -> Vec<WorkflowAction> {
        self.output = Some(self.task.clone());
        match self.task.status {
            WorkflowTaskStatus::Faulted => {
                let err = self
                    .error
                    .clone()
                    .unwrap_or_else(|| WorkflowError::new("workflow task faulted"));
                vec![WorkflowAction::FailWorkflow { error: err }]
            }
            _ => vec![WorkflowAction::complete(
                serde_json::to_value(&self.task).unwrap_or(Value::Null),
            )],
        }
    }
}
