//! Function execution context (spec §4.6)

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thand_core::provider::Provider;
use thand_core::ElevateRequest;

/// Looks up a registered provider by name or kind. Mirrors
/// `thand_core::registry::ProviderRegistry::get`, but kept as a trait
/// object here so the runner doesn't force a concrete registry type on
/// every caller (e.g. tests can substitute a closure-backed lookup).
pub trait ProviderLookup: Send + Sync {
    fn lookup(&self, name_or_kind: &str) -> Option<Arc<dyn Provider>>;
}

impl<F> ProviderLookup for F
where
    F: Fn(&str) -> Option<Arc<dyn Provider>> + Send + Sync,
{
    fn lookup(&self, name_or_kind: &str) -> Option<Arc<dyn Provider>> {
        self(name_or_kind)
    }
}

/// Everything a [`super::Function`] needs to validate and execute a single
/// `call` task (spec §4.6/§4.8).
pub struct FunctionContext<'a> {
    /// The full evaluation document (`$context`/`.`).
    pub context: &'a Value,
    /// Named variable bindings available in this task's scope
    /// (`$task`, `$workflow`, `$input`, user `use.variables`).
    pub variables: &'a HashMap<String, Value>,
    pub request: &'a ElevateRequest,
    pub providers: &'a dyn ProviderLookup,
    pub now: DateTime<Utc>,
}
