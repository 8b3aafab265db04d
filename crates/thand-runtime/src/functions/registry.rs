//! Function contract & registry (spec §4.6)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thand_core::ThandError;

use super::context::FunctionContext;

/// A named, versioned function handler invoked from workflow `call` tasks
/// (spec §2 "Function registry", §4.6).
#[async_trait]
pub trait Function: Send + Sync {
    /// Dotted name, e.g. `thand.authorize`.
    fn name(&self) -> &str;

    fn required_params(&self) -> &[&str] {
        &[]
    }

    fn optional_params(&self) -> &[&str] {
        &[]
    }

    /// Checked before `execute`; rejects a call whose `with` block is
    /// missing a required parameter.
    fn validate_request(&self, with: &Value) -> Result<(), ThandError> {
        let Value::Object(map) = with else {
            if self.required_params().is_empty() {
                return Ok(());
            }
            return Err(ThandError::validation(format!(
                "{:?} requires a `with` object",
                self.name()
            )));
        };
        for required in self.required_params() {
            if !map.contains_key(*required) {
                return Err(ThandError::validation(format!(
                    "{:?} is missing required parameter {:?}",
                    self.name(),
                    required
                )));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &FunctionContext<'_>, with: &Value) -> Result<Value, ThandError>;

    /// Default splice expression applied to this function's output unless
    /// the DSL task overrides it with its own `export.as` (spec §4.6:
    /// "thand.authorize ... Its Export merges the response into the
    /// workflow context"). `None` means no implicit export.
    fn default_export(&self) -> Option<Value> {
        None
    }
}

/// Dispatch table for `call` tasks, keyed by dotted function name.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: Arc<dyn Function>) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Function for Echo {
        fn name(&self) -> &str {
            "test.echo"
        }

        fn required_params(&self) -> &[&str] {
            &["message"]
        }

        async fn execute(&self, _ctx: &FunctionContext<'_>, with: &Value) -> Result<Value, ThandError> {
            Ok(with.clone())
        }
    }

    #[test]
    fn validate_request_rejects_missing_required_param() {
        let f = Echo;
        assert!(f.validate_request(&serde_json::json!({})).is_err());
        assert!(f
            .validate_request(&serde_json::json!({"message": "hi"}))
            .is_ok());
    }

    #[test]
    fn registry_looks_up_by_dotted_name() {
        let mut registry = FunctionRegistry::new();
        registry.register(Arc::new(Echo));
        assert!(registry.get("test.echo").is_some());
        assert!(registry.get("test.missing").is_none());
    }
}
