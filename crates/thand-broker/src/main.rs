// Thand broker
// Decision: the only HTTP surface this binary owns is the OAuth2 callback
// plus a health check; the provider admin CLI/HTTP surface is out of scope.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use thand_broker::workflow_manager::CreateWorkflowOutcome;
use thand_broker::{ServicesClient, ServicesConfig, SessionManager, WorkflowManager};
use thand_core::catalog::RoleCatalog;
use thand_core::provider::{Capability, Provider};
use thand_core::registry::ProviderRegistry;
use thand_core::ThandError;
use thand_durable::activity::ActivityContext;
use thand_durable::persistence::InMemoryWorkflowEventStore;
use thand_durable::{ExecutorConfig, WorkflowExecutor};
use thand_providers::RemoteProvider;
use thand_runtime::dsl::DslRegistry;
use thand_runtime::functions::builtin_registry;
use thand_runtime::orchestrator::{ExecuteElevationWorkflow, RunStepActivity, RunStepInput};
use thand_runtime::task_registry::TaskRegistry;

type Store = Arc<InMemoryWorkflowEventStore>;

#[derive(Clone)]
struct AppState {
    manager: Arc<WorkflowManager<Store>>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(Deserialize)]
struct CallbackParams {
    state: String,
}

/// Decodes the OAuth2 `state` parameter back into a [`thand_core::model::WorkflowTask`]
/// and resumes it (spec §6 "Inbound: the broker's local callback ... decodes
/// it to a WorkflowTask, and calls ResumeWorkflow").
async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> axum::response::Response {
    let decoded = match state.manager.decode_callback_state(&params.state) {
        Ok(task) => task,
        Err(e) => return (StatusCode::BAD_REQUEST, e.message).into_response(),
    };

    match state.manager.resume_workflow(decoded).await {
        Ok(task) => Json(task).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.message).into_response(),
    }
}

/// The outbound half of spec §6: accepts an `ElevateRequest`, and either
/// redirects the caller through the provider's authorize-session URL, or,
/// if a validated session already covers it, runs the workflow immediately
/// and returns the resulting task.
async fn elevate(
    State(state): State<AppState>,
    Json(req): Json<thand_core::model::ElevateRequest>,
) -> axum::response::Response {
    match state.manager.create_workflow(req).await {
        Ok(CreateWorkflowOutcome::AuthorizeRedirect { redirect_url, .. }) => {
            Redirect::to(&redirect_url).into_response()
        }
        // An active session already covers this request: no provider
        // round trip needed, run the workflow straight away.
        Ok(CreateWorkflowOutcome::LocalCallback { task, .. }) => match state.manager.resume_workflow(task).await {
            Ok(task) => Json(task).into_response(),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.message).into_response(),
        },
        Err(e) => (StatusCode::BAD_REQUEST, e.message).into_response(),
    }
}

/// Maps a catalog capability name to the typed [`Capability`] tag (spec
/// §4.4; the catalog keeps capability names as plain strings since they
/// come from a config file, not Rust source).
fn parse_capability(name: &str) -> Option<Capability> {
    match name {
        "authorizer" => Some(Capability::Authorizer),
        "rbac" => Some(Capability::Rbac),
        "identities" => Some(Capability::Identities),
        "notifier" => Some(Capability::Notifier),
        _ => None,
    }
}

/// Builds the provider registry from the role catalog: every enabled
/// provider entry that has a `THAND_PROVIDER_<NAME>_ENDPOINT` environment
/// variable set gets a [`RemoteProvider`] pointed at it; everything else is
/// left unregistered, which surfaces as "provider does not exist" at the
/// point of use rather than at startup (spec §4.11 graceful degradation).
fn build_provider_registry(catalog: &RoleCatalog) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    for (kind, entry) in catalog.providers() {
        if !entry.enabled {
            continue;
        }
        let env_prefix = kind.to_ascii_uppercase().replace(['-', '.'], "_");
        let endpoint = match std::env::var(format!("THAND_PROVIDER_{env_prefix}_ENDPOINT")) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(provider = %kind, "no endpoint configured; provider left unregistered");
                continue;
            }
        };
        let key = std::env::var(format!("THAND_PROVIDER_{env_prefix}_KEY")).unwrap_or_default();
        let capabilities: Vec<Capability> = entry.capabilities.iter().filter_map(|c| parse_capability(c)).collect();

        let kind = kind.clone();
        let factory_kind = kind.clone();
        let factory_key = key.clone();
        let factory_endpoint = endpoint.clone();
        let factory_caps = capabilities.clone();
        registry.register(
            &kind,
            Arc::new(RemoteProvider::new(kind.clone(), key, endpoint, capabilities)) as Arc<dyn Provider>,
            Arc::new(move || {
                Arc::new(RemoteProvider::new(
                    factory_kind.clone(),
                    factory_key.clone(),
                    factory_endpoint.clone(),
                    factory_caps.clone(),
                )) as Arc<dyn Provider>
            }),
        );
        tracing::info!(provider = %kind, "registered remote provider");
    }
    registry
}

/// Bridges the worker pool's generic task-claiming loop to the durable
/// orchestrator's event-sourced state machine: the pool only needs an
/// `ActivityResult` to mark the task complete/failed in the store, but the
/// workflow itself only advances once `on_activity_completed`/
/// `on_activity_failed` is called directly (worker pool and executor are
/// architecturally independent - see `thand_durable::worker::WorkerPool`).
fn run_step_handler(
    activity: Arc<RunStepActivity>,
    executor: Arc<WorkflowExecutor<Store>>,
) -> impl Fn(
    thand_durable::persistence::ClaimedTask,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = thand_durable::worker::ActivityResult> + Send>>
       + Send
       + Sync
       + 'static {
    move |claimed| {
        let activity = activity.clone();
        let executor = executor.clone();
        Box::pin(async move {
            let input: RunStepInput = serde_json::from_value(claimed.input.clone())
                .map_err(|e| format!("malformed activity input: {e}"))?;
            let ctx = ActivityContext::new(claimed.workflow_id, claimed.activity_id.clone(), claimed.attempt, claimed.max_attempts);

            match thand_durable::activity::Activity::execute(activity.as_ref(), &ctx, input).await {
                Ok(output) => {
                    let value = serde_json::to_value(&output).map_err(|e| e.to_string())?;
                    if let Err(e) = executor
                        .on_activity_completed(claimed.workflow_id, &claimed.activity_id, value.clone())
                        .await
                    {
                        tracing::error!(error = %e, "failed to advance workflow after activity completion");
                    }
                    Ok(value)
                }
                Err(e) => {
                    if let Err(advance_err) = executor
                        .on_activity_failed(claimed.workflow_id, &claimed.activity_id, e.clone(), false)
                        .await
                    {
                        tracing::error!(error = %advance_err, "failed to advance workflow after activity failure");
                    }
                    Err(e.message)
                }
            }
        })
    }
}

fn load_dsl() -> DslRegistry {
    let mut registry = DslRegistry::new();
    if let Ok(path) = std::env::var("THAND_WORKFLOWS_CONFIG") {
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_yaml::from_str::<Vec<thand_runtime::dsl::WorkflowDefinition>>(&text) {
                Ok(defs) => {
                    for def in defs {
                        tracing::info!(workflow = %def.name, "registered workflow definition");
                        registry.register(def);
                    }
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "failed to parse workflow config; no workflows registered"),
            },
            Err(e) => tracing::warn!(path = %path, error = %e, "failed to read workflow config; no workflows registered"),
        }
    } else {
        tracing::warn!("THAND_WORKFLOWS_CONFIG not set; no workflows registered");
    }
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "thand_broker=info".into()))
        .init();

    tracing::info!("thand-broker starting");

    let catalog = RoleCatalog::load().context("failed to load role catalog")?;
    let providers = Arc::new(build_provider_registry(&catalog));
    let dsl = Arc::new(load_dsl());
    let functions = Arc::new(builtin_registry());
    let tasks = Arc::new(TaskRegistry::default_registry());
    let sessions = Arc::new(SessionManager::new(SessionManager::default_dir()));

    let store: Store = Arc::new(InMemoryWorkflowEventStore::new());
    let mut executor = WorkflowExecutor::with_config(store.clone(), ExecutorConfig::default());
    executor.register::<ExecuteElevationWorkflow>();
    let executor = Arc::new(executor);

    let encryption_key = std::env::var("THAND_ENCRYPTION_KEY").ok().and_then(|b64| {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(arr)
    });

    let services = ServicesClient::initialize(
        ServicesConfig {
            encryption_key,
            ..Default::default()
        },
        Some(executor.clone()),
    )
    .await;

    let callback_base =
        std::env::var("THAND_CALLBACK_BASE_URL").unwrap_or_else(|_| "http://localhost:8080/callback".to_string());

    let manager = Arc::new(WorkflowManager::new(
        dsl.clone(),
        functions.clone(),
        tasks.clone(),
        providers.clone(),
        sessions,
        services.encryption,
        services.durable,
        callback_base,
    ));

    let run_step_activity = Arc::new(RunStepActivity {
        dsl: (*dsl).clone(),
        functions: builtin_registry(),
        tasks: TaskRegistry::default_registry(),
        providers: (*providers).clone(),
    });

    let worker_pool_config = thand_durable::WorkerPoolConfig::new(vec![
        thand_runtime::orchestrator::RUN_STEP_ACTIVITY_TYPE.to_string(),
    ]);
    let worker_pool = thand_durable::WorkerPool::new(store.clone() as Arc<dyn thand_durable::WorkflowEventStore>, worker_pool_config);
    worker_pool.register_handler(
        thand_runtime::orchestrator::RUN_STEP_ACTIVITY_TYPE,
        run_step_handler(run_step_activity, executor.clone()),
    );
    worker_pool.start().await.context("failed to start worker pool")?;

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/callback", get(callback))
        .route("/elevate", post(elevate))
        .with_state(AppState { manager })
        .layer(TraceLayer::new_for_http());

    let listen_addr = std::env::var("THAND_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&listen_addr).await.context("failed to bind listen address")?;
    tracing::info!(addr = %listen_addr, "listening");

    axum::serve(listener, app).await.context("server error")?;

    worker_pool.shutdown().await.ok();
    services.shutdown().await;

    Ok(())
}
