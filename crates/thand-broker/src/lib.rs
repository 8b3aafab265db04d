//! Workflow manager facade, services client, session manager, and the
//! OAuth2 callback surface for the JIT privileged-access broker (spec
//! §4.5, §4.10, §4.11, §6).

pub mod services_client;
pub mod session;
pub mod workflow_manager;

pub use services_client::{ServicesClient, ServicesConfig};
pub use session::SessionManager;
pub use workflow_manager::{CatalogElevationPipeline, CreateWorkflowOutcome, ElevationPipeline, WorkflowManager};
