//! Workflow manager facade (spec §4.10): the boundary between the HTTP-side
//! OAuth2 callback and the workflow-side runner/orchestrator. `CreateWorkflow`
//! is the gate a new `ElevateRequest` passes through; `ResumeWorkflow` and
//! `Hydrate` are what every subsequent resume (callback, signal, restart)
//! goes through.

use std::sync::Arc;

use uuid::Uuid;

use thand_core::encoding::{decode, encode, EncryptionKey, EnvelopeKind};
use thand_core::model::{ElevateRequest, WorkflowTask};
use thand_core::provider::AuthorizeUser;
use thand_core::registry::ProviderRegistry;
use thand_core::ThandError;
use thand_durable::persistence::{StoreError, WorkflowEventStore};
use thand_durable::workflow::WorkflowSignal;
use thand_durable::{ExecutorError, WorkflowExecutor};
use thand_runtime::dsl::DslRegistry;
use thand_runtime::functions::FunctionRegistry;
use thand_runtime::orchestrator::{ElevationWorkflowInput, ExecuteElevationWorkflow};
use thand_runtime::task_registry::TaskRegistry;
use thand_runtime::WorkflowRunner;

use crate::session::SessionManager;

/// Outcome of [`WorkflowManager::create_workflow`]: either the caller
/// already has a usable session and can call back locally, or must first
/// be redirected through the provider's authorize-session URL (spec
/// §4.10).
pub enum CreateWorkflowOutcome {
    LocalCallback { task: WorkflowTask, callback_url: String },
    AuthorizeRedirect { task: WorkflowTask, redirect_url: String },
}

/// Drives one [`WorkflowTask`] either through a durable orchestrator
/// instance (`S` configured) or, absent one, directly through the
/// in-process [`WorkflowRunner`] (spec §4.10 "invokes the in-process runner").
pub struct WorkflowManager<S: WorkflowEventStore> {
    dsl: Arc<DslRegistry>,
    functions: Arc<FunctionRegistry>,
    tasks: Arc<TaskRegistry>,
    providers: Arc<ProviderRegistry>,
    sessions: Arc<SessionManager>,
    encryption_key: Option<EncryptionKey>,
    durable: Option<Arc<WorkflowExecutor<S>>>,
    local_callback_base: String,
}

impl<S: WorkflowEventStore> WorkflowManager<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dsl: Arc<DslRegistry>,
        functions: Arc<FunctionRegistry>,
        tasks: Arc<TaskRegistry>,
        providers: Arc<ProviderRegistry>,
        sessions: Arc<SessionManager>,
        encryption_key: Option<EncryptionKey>,
        durable: Option<Arc<WorkflowExecutor<S>>>,
        local_callback_base: impl Into<String>,
    ) -> Self {
        Self {
            dsl,
            functions,
            tasks,
            providers,
            sessions,
            encryption_key,
            durable,
            local_callback_base: local_callback_base.into(),
        }
    }

    /// Validates `req`, resolves the authenticator's session, and either
    /// hands back a ready-to-resume task with a local callback URL, or an
    /// authorize-session redirect with the task encoded as OAuth2 `state`
    /// (spec §4.10, §6).
    pub async fn create_workflow(&self, req: ElevateRequest) -> Result<CreateWorkflowOutcome, ThandError> {
        req.validate()?;
        self.dsl.resolve(&req.workflow)?;

        // The authenticator doubles as the session-provider key unless the
        // request pins a different one explicitly (spec §4.10 "resolves the
        // authenticator, picking up the session provider if absent").
        let session_provider = req.session.clone().unwrap_or_else(|| req.authenticator.clone());
        let server = &req.authenticator;

        let provider = self.providers.get(&session_provider).ok_or_else(|| {
            ThandError::validation(format!("provider does not exist: {session_provider:?}"))
        })?;
        let authorizer = provider.as_authorizer().ok_or_else(|| {
            ThandError::validation(format!(
                "provider {session_provider:?} does not implement the authorizer capability"
            ))
        })?;

        let identity = req.identities.first().cloned().unwrap_or_default();

        if let Ok(session) = self.sessions.first_active_session(server, &[session_provider.clone()]) {
            if authorizer.validate_session(&session).await.is_ok() {
                let mut task = WorkflowTask::new(Uuid::now_v7(), req.workflow.clone(), req);
                task.request.session = Some(session_provider);
                let callback_url = format!("{}/{}", self.local_callback_base.trim_end_matches('/'), task.workflow_id);
                return Ok(CreateWorkflowOutcome::LocalCallback { task, callback_url });
            }
        }

        let mut task = WorkflowTask::new(Uuid::now_v7(), req.workflow.clone(), req);
        task.request.session = Some(session_provider);

        let redirect_url = authorizer
            .authorize_session(&AuthorizeUser {
                identity,
                redirect_uri: self.local_callback_base.clone(),
            })
            .await?;

        let state = encode(&task, EnvelopeKind::WorkflowTask, self.encryption_key.as_ref())?;
        let separator = if redirect_url.contains('?') { '&' } else { '?' };
        let redirect_url = format!("{redirect_url}{separator}state={state}");

        Ok(CreateWorkflowOutcome::AuthorizeRedirect { task, redirect_url })
    }

    /// Rebinds a decoded task to the live DSL, failing clearly if the
    /// workflow name is no longer registered (spec §4.10: "Called on every
    /// resume").
    pub fn hydrate(&self, task: WorkflowTask) -> Result<WorkflowTask, ThandError> {
        self.dsl.resolve(&task.dsl_name)?;
        Ok(task)
    }

    /// Decodes an OAuth2 `state` parameter back into a [`WorkflowTask`]
    /// (spec §6 "Inbound: the broker's local callback ... decodes it to a
    /// WorkflowTask").
    pub fn decode_callback_state(&self, state: &str) -> Result<WorkflowTask, ThandError> {
        decode(state, EnvelopeKind::WorkflowTask, self.encryption_key.as_ref())
    }

    /// Advances `task` one step further: through the durable orchestrator
    /// if one is configured, otherwise the in-process runner (spec §4.10).
    pub async fn resume_workflow(&self, task: WorkflowTask) -> Result<WorkflowTask, ThandError> {
        let task = self.hydrate(task)?;

        match &self.durable {
            Some(executor) => {
                self.resume_via_orchestrator(executor, task).await
            }
            None => {
                let providers = self.providers.clone();
                let lookup = move |name: &str| providers.get(name);
                let runner = WorkflowRunner::new(&self.dsl, &self.functions, &self.tasks, &lookup);
                let mut task = task;
                runner.run(&mut task).await?;
                Ok(task)
            }
        }
    }

    /// `start_workflow` mints its own identity (the durable store owns
    /// workflow-id generation), so the first resume of a never-started task
    /// discovers rather than dictates `workflow_id`; every later resume on
    /// the same task reuses it to signal the already-running instance.
    async fn resume_via_orchestrator(
        &self,
        executor: &Arc<WorkflowExecutor<S>>,
        mut task: WorkflowTask,
    ) -> Result<WorkflowTask, ThandError> {
        let signal = WorkflowSignal::custom(
            "resume",
            serde_json::to_value(&task).unwrap_or(serde_json::Value::Null),
        );

        let workflow_id = match executor.send_signal(task.workflow_id, signal).await {
            Ok(()) => task.workflow_id,
            Err(ExecutorError::Store(StoreError::WorkflowNotFound(_))) => {
                let started_id = executor
                    .start_workflow::<ExecuteElevationWorkflow>(
                        ElevationWorkflowInput { task: task.clone() },
                        None,
                    )
                    .await
                    .map_err(|e| ThandError::transient_provider(format!("failed to start workflow: {e}")))?;
                task.workflow_id = started_id;
                started_id
            }
            Err(e) => {
                return Err(ThandError::transient_provider(format!("failed to signal workflow: {e}")));
            }
        };

        executor
            .process_workflow(workflow_id)
            .await
            .map_err(|e| ThandError::transient_provider(format!("failed to process workflow: {e}")))?;

        let info = executor
            .store()
            .get_workflow_info(workflow_id)
            .await
            .map_err(|e| ThandError::transient_provider(format!("failed to load workflow info: {e}")))?;

        match info.result {
            Some(result) => serde_json::from_value(result)
                .map_err(|e| ThandError::transient_provider(format!("malformed workflow result: {e}"))),
            None => Ok(task),
        }
    }
}

/// Resolves an `ElevateRequest` into one concrete decision (role + provider
/// set), without itself reaching into any LLM or catalog-query machinery
/// (spec §4.10, §2 component table: "called by but not part of the runner
/// core"). The only implementation this crate ships resolves a role by name
/// directly from a [`thand_core::catalog::RoleCatalog`].
#[async_trait::async_trait]
pub trait ElevationPipeline: Send + Sync {
    async fn propose(&self, role_name: &str, identity: &str, reason: &str) -> Result<ElevateRequest, ThandError>;
}

/// Direct (non-LLM) [`ElevationPipeline`]: looks the named role up in a
/// [`thand_core::catalog::RoleCatalog`] and builds the request from it
/// verbatim.
pub struct CatalogElevationPipeline {
    catalog: Arc<thand_core::catalog::RoleCatalog>,
    workflow: String,
    authenticator: String,
    duration: String,
}

impl CatalogElevationPipeline {
    pub fn new(
        catalog: Arc<thand_core::catalog::RoleCatalog>,
        workflow: impl Into<String>,
        authenticator: impl Into<String>,
        duration: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            workflow: workflow.into(),
            authenticator: authenticator.into(),
            duration: duration.into(),
        }
    }
}

#[async_trait::async_trait]
impl ElevationPipeline for CatalogElevationPipeline {
    async fn propose(&self, role_name: &str, identity: &str, reason: &str) -> Result<ElevateRequest, ThandError> {
        let role = self
            .catalog
            .role(role_name)
            .cloned()
            .ok_or_else(|| ThandError::validation(format!("unknown role: {role_name:?}")))?;

        Ok(ElevateRequest {
            reason: reason.to_string(),
            duration: self.duration.clone(),
            providers: role.providers.clone(),
            identities: vec![identity.to_string()],
            authenticator: self.authenticator.clone(),
            role,
            workflow: self.workflow.clone(),
            session: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thand_core::model::{PermissionSet, Role};
    use thand_core::provider::Provider;
    use thand_durable::persistence::InMemoryWorkflowEventStore;
    use thand_providers::InMemoryProvider;

    fn role() -> Role {
        Role {
            name: "billing-reader".into(),
            description: String::new(),
            providers: vec!["aws-prod".into()],
            inherits: vec![],
            permissions: PermissionSet::default(),
            resources: PermissionSet::default(),
            authenticators: vec![],
            workflows: vec!["elevate".into()],
            enabled: true,
        }
    }

    fn request() -> ElevateRequest {
        ElevateRequest {
            reason: "access to billing".into(),
            duration: "PT1H".into(),
            providers: vec!["aws-prod".into()],
            identities: vec!["u@example.com".into()],
            authenticator: "aws-prod".into(),
            role: role(),
            workflow: "elevate".into(),
            session: None,
        }
    }

    fn manager() -> WorkflowManager<InMemoryWorkflowEventStore> {
        let mut dsl = DslRegistry::new();
        dsl.register(thand_runtime::dsl::WorkflowDefinition { name: "elevate".into(), tasks: vec![] });

        let providers = ProviderRegistry::new();
        providers.set(
            "aws-prod",
            Arc::new(InMemoryProvider::new("aws-prod")) as Arc<dyn Provider>,
            Arc::new(|| Arc::new(InMemoryProvider::new("aws-prod")) as Arc<dyn Provider>),
        );

        let sessions = SessionManager::new(std::env::temp_dir().join(format!("thand-wfm-test-{}", Uuid::new_v4())));

        WorkflowManager::new(
            Arc::new(dsl),
            Arc::new(thand_runtime::functions::builtin_registry()),
            Arc::new(TaskRegistry::default_registry()),
            Arc::new(providers),
            Arc::new(sessions),
            None,
            None,
            "https://broker.example.com/callback",
        )
    }

    #[tokio::test]
    async fn create_workflow_without_a_session_returns_an_authorize_redirect() {
        let mgr = manager();
        let outcome = mgr.create_workflow(request()).await.unwrap();
        match outcome {
            CreateWorkflowOutcome::AuthorizeRedirect { redirect_url, .. } => {
                assert!(redirect_url.contains("state="));
            }
            CreateWorkflowOutcome::LocalCallback { .. } => panic!("expected a redirect, no session exists yet"),
        }
    }

    #[tokio::test]
    async fn unknown_workflow_name_is_rejected_before_any_provider_call() {
        let mgr = manager();
        let mut req = request();
        req.workflow = "no-such-workflow".into();
        assert!(mgr.create_workflow(req).await.is_err());
    }

    #[tokio::test]
    async fn resume_without_a_durable_orchestrator_runs_in_process() {
        let mgr = manager();
        let task = WorkflowTask::new(Uuid::now_v7(), "elevate", request());
        let resumed = mgr.resume_workflow(task).await.unwrap();
        assert_eq!(resumed.status, thand_core::model::WorkflowTaskStatus::Completed);
    }

    #[tokio::test]
    async fn catalog_pipeline_resolves_a_known_role() {
        let catalog = Arc::new(thand_core::catalog::RoleCatalog::load().unwrap());
        let pipeline = CatalogElevationPipeline::new(catalog, "elevate", "oauth2.google", "PT1H");
        let req = pipeline.propose("billing-reader", "u@example.com", "need it").await.unwrap();
        assert_eq!(req.role.name, "billing-reader");
    }
}
