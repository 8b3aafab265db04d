//! Provider registry (spec §4.3): a process-wide, case-insensitive mapping
//! from provider-kind string to a constructable provider template.
//!
//! No RPC - this is a local factory, thread-safe under concurrent
//! registration-at-init and runtime lookups via a single `RwLock`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::ThandError;
use crate::provider::Provider;

/// A constructor that produces a fresh, zero-valued instance of some
/// concrete `Provider` type (spec §4.3 `CreateInstance`).
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    template: Arc<dyn Provider>,
    factory: ProviderFactory,
}

/// Process-wide provider registry. Clone is cheap (shares the inner lock).
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-registration wins: a second `register` for the same kind is a
    /// no-op (spec §4.3).
    pub fn register(&self, kind: &str, template: Arc<dyn Provider>, factory: ProviderFactory) {
        let key = kind.to_ascii_lowercase();
        let mut entries = self.entries.write().expect("provider registry lock poisoned");
        entries.entry(key).or_insert(Entry { template, factory });
    }

    /// Unconditional overwrite, for test substitution (spec §4.3 `Set`).
    pub fn set(&self, kind: &str, template: Arc<dyn Provider>, factory: ProviderFactory) {
        let key = kind.to_ascii_lowercase();
        let mut entries = self.entries.write().expect("provider registry lock poisoned");
        entries.insert(key, Entry { template, factory });
    }

    /// Returns the shared template instance for `kind`, if registered.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Provider>> {
        let key = kind.to_ascii_lowercase();
        let entries = self.entries.read().expect("provider registry lock poisoned");
        entries.get(&key).map(|e| e.template.clone())
    }

    /// Returns a fresh, independently-owned instance of the same concrete
    /// type registered under `kind` (spec §4.3 `CreateInstance`).
    pub fn create_instance(&self, kind: &str) -> Result<Arc<dyn Provider>, ThandError> {
        let key = kind.to_ascii_lowercase();
        let entries = self.entries.read().expect("provider registry lock poisoned");
        let entry = entries
            .get(&key)
            .ok_or_else(|| ThandError::validation(format!("provider does not exist: {kind:?}")))?;
        Ok((entry.factory)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Capability;

    struct Dummy(&'static str);

    impl Provider for Dummy {
        fn kind(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> &[Capability] {
            &[]
        }
    }

    fn factory_for(name: &'static str) -> ProviderFactory {
        Arc::new(move || Arc::new(Dummy(name)) as Arc<dyn Provider>)
    }

    #[test]
    fn get_is_case_insensitive() {
        let reg = ProviderRegistry::new();
        reg.register("AWS-Prod", Arc::new(Dummy("aws-prod")), factory_for("aws-prod"));
        assert!(reg.get("aws-prod").is_some());
        assert!(reg.get("AWS-PROD").is_some());
    }

    #[test]
    fn first_registration_wins() {
        let reg = ProviderRegistry::new();
        reg.register("okta", Arc::new(Dummy("first")), factory_for("first"));
        reg.register("okta", Arc::new(Dummy("second")), factory_for("second"));
        assert_eq!(reg.get("okta").unwrap().kind(), "first");
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let reg = ProviderRegistry::new();
        reg.register("okta", Arc::new(Dummy("first")), factory_for("first"));
        reg.set("okta", Arc::new(Dummy("second")), factory_for("second"));
        assert_eq!(reg.get("okta").unwrap().kind(), "second");
    }

    #[test]
    fn create_instance_is_independent_of_template() {
        let reg = ProviderRegistry::new();
        reg.register("okta", Arc::new(Dummy("okta")), factory_for("okta"));
        let a = reg.create_instance("okta").unwrap();
        let b = reg.create_instance("okta").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let reg = ProviderRegistry::new();
        let err = reg.create_instance("nope").unwrap_err();
        assert!(err.message.contains("does not exist"));
    }
}
