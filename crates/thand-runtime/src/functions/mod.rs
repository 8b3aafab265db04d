//! Function registry & contract (spec §4.6): named, versioned function
//! handlers invoked from workflow `call` tasks.

pub mod builtin;
pub mod context;
pub mod registry;

pub use builtin::{AuthorizeFunction, NotifyFunction, RevokeFunction, WaitFunction};
pub use context::{FunctionContext, ProviderLookup};
pub use registry::{Function, FunctionRegistry};

use std::sync::Arc;

/// Builds a [`FunctionRegistry`] pre-populated with the three core
/// functions every runner must provide (spec §4.6), plus `thand.wait` for
/// the duration-gated pause every elevation workflow needs.
pub fn builtin_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register(Arc::new(NotifyFunction));
    registry.register(Arc::new(AuthorizeFunction));
    registry.register(Arc::new(RevokeFunction));
    registry.register(Arc::new(WaitFunction));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_all_three_core_functions() {
        let registry = builtin_registry();
        assert!(registry.get("thand.notify").is_some());
        assert!(registry.get("thand.authorize").is_some());
        assert!(registry.get("thand.revoke").is_some());
    }
}
