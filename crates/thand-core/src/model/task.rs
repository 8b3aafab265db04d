//! `WorkflowTask` - the unit of persistence (spec §3, §3.1)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::request::ElevateRequest;

/// Status of a `WorkflowTask`. Monotonic through `{pending -> running}`,
/// then either stays in the resumable set (`running`, `waiting`,
/// `suspended`) or moves to exactly one terminal status (spec §3 invariant).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTaskStatus {
    Pending,
    Running,
    Waiting,
    Suspended,
    Completed,
    Faulted,
    Cancelled,
}

impl WorkflowTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowTaskStatus::Completed | WorkflowTaskStatus::Faulted | WorkflowTaskStatus::Cancelled
        )
    }

    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            WorkflowTaskStatus::Running | WorkflowTaskStatus::Waiting | WorkflowTaskStatus::Suspended
        )
    }
}

/// Per-task execution record, captured by the runner on every dispatch
/// (spec §4.8: "Record per-task input, output, startedAt, endedAt, and (if
/// faulted) the error kind and message").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

/// Current task cursor + accumulated per-task records + workflow-level
/// context/variables maps (spec §3 `State`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskState {
    /// Current cursor: `None` means "workflow start".
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub records: HashMap<String, TaskRecord>,
    #[serde(default)]
    pub context: serde_json::Map<String, Value>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Set once `thand.authorize` has recorded a response; the cleanup
    /// guarantee (spec §4.9) checks this before running revocation.
    #[serde(default)]
    pub approved: bool,
}

/// The unit of persistence (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowTask {
    pub workflow_id: Uuid,
    /// Workflow definition name; re-resolved by name on every resume.
    pub dsl_name: String,
    pub status: WorkflowTaskStatus,
    pub state: TaskState,
    /// Canonical map form of the originating `ElevateRequest` (spec §3
    /// `Context`); kept alongside the typed request for code that wants
    /// typed access.
    pub request: ElevateRequest,
}

impl WorkflowTask {
    pub fn new(workflow_id: Uuid, dsl_name: impl Into<String>, request: ElevateRequest) -> Self {
        Self {
            workflow_id,
            dsl_name: dsl_name.into(),
            status: WorkflowTaskStatus::Pending,
            state: TaskState::default(),
            request,
        }
    }

    /// Builds the canonical context map handed to the expression evaluator
    /// as `$context`/`.` (spec §3 `Context`, §4.8).
    pub fn context_document(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("user".into(), Value::String(self.request.identities.join(",")));
        map.insert(
            "role".into(),
            serde_json::to_value(&self.request.role).unwrap_or(Value::Null),
        );
        map.insert(
            "providers".into(),
            serde_json::to_value(&self.request.providers).unwrap_or(Value::Null),
        );
        map.insert(
            "identities".into(),
            serde_json::to_value(&self.request.identities).unwrap_or(Value::Null),
        );
        map.insert("duration".into(), Value::String(self.request.duration.clone()));
        map.insert("reason".into(), Value::String(self.request.reason.clone()));
        map.insert(
            "authenticator".into(),
            Value::String(self.request.authenticator.clone()),
        );
        map.insert("workflow".into(), Value::String(self.request.workflow.clone()));
        if let Some(session) = &self.request.session {
            map.insert("session".into(), Value::String(session.clone()));
        }
        for (k, v) in &self.state.context {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

/// Opaque per-capability response/metadata bag (spec §4.4/§9 open question
/// on lost `Metadata`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorizeRoleResponse {
    pub identity: String,
    pub provider: String,
    #[serde(default)]
    pub metadata: Value,
    pub authorized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevokeRoleRequest {
    pub identity: String,
    pub provider: String,
    /// Prior authorize response, when available (spec §4.6 `thand.revoke`:
    /// "best-effort cleanup" when absent).
    #[serde(default)]
    pub prior: Option<AuthorizeRoleResponse>,
}

/// Response to `RevokeRole` (spec §4.4: "`RevokeRole(req+prior resp) → resp`").
/// Recorded under `revocations[identity]` by `thand.revoke` the same way
/// `AuthorizeRoleResponse` is recorded under `authorizations[identity]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RevokeRoleResponse {
    pub identity: String,
    pub provider: String,
    #[serde(default)]
    pub metadata: Value,
    pub revoked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::{PermissionSet, Role};

    fn sample_request() -> ElevateRequest {
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

    #[test]
    fn status_terminal_classification() {
        assert!(WorkflowTaskStatus::Completed.is_terminal());
        assert!(WorkflowTaskStatus::Faulted.is_terminal());
        assert!(WorkflowTaskStatus::Cancelled.is_terminal());
        assert!(!WorkflowTaskStatus::Running.is_terminal());
        assert!(WorkflowTaskStatus::Waiting.is_resumable());
    }

    #[test]
    fn context_document_carries_request_fields() {
        let task = WorkflowTask::new(Uuid::new_v4(), "elevate", sample_request());
        let doc = task.context_document();
        assert_eq!(doc["reason"], Value::String("access to billing".into()));
        assert_eq!(doc["role"]["name"], Value::String("billing-reader".into()));
    }

    #[test]
    fn new_task_starts_pending_with_no_cursor() {
        let task = WorkflowTask::new(Uuid::new_v4(), "elevate", sample_request());
        assert_eq!(task.status, WorkflowTaskStatus::Pending);
        assert!(task.state.entrypoint.is_none());
    }
}
