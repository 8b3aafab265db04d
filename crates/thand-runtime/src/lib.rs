//! Workflow DSL model, function/task registries, runner, and the durable
//! orchestrator binding for the JIT privileged-access broker's workflow
//! execution core (spec §4.6-§4.9).
//!
//! This crate sits on top of `thand-core` (data model, expression
//! evaluator, provider contract) and `thand-durable` (the generic
//! event-sourced engine); it supplies the one concrete workflow -
//! [`orchestrator::ExecuteElevationWorkflow`] - that engine runs.

pub mod dsl;
pub mod functions;
pub mod orchestrator;
pub mod runner;
pub mod task_registry;

pub use dsl::{DslRegistry, ExportSpec, TaskDef, WorkflowDefinition};
pub use functions::{builtin_registry, Function, FunctionContext, FunctionRegistry, ProviderLookup};
pub use orchestrator::ExecuteElevationWorkflow;
pub use runner::WorkflowRunner;
pub use task_registry::{TaskRegistry, CLEANUP_TASK_KIND, CLEANUP_TASK_NAME};
