//! Data model (spec §3): `WorkflowTask`, `ElevateRequest`, `Role`, `LocalSession`.

pub mod request;
pub mod role;
pub mod session;
pub mod task;

pub use request::ElevateRequest;
pub use role::{resolve_composite_role, InheritRef, PermissionSet, Role};
pub use session::{first_active_session, LocalSession};
pub use task::{
    AuthorizeRoleResponse, RevokeRoleRequest, RevokeRoleResponse, TaskRecord, TaskState,
    WorkflowTask, WorkflowTaskStatus,
};
