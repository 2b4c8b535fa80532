//! Role-keyed dependency lookup
//!
//! `References` is the set of collaborators handed to a component;
//! `DependencyResolver` maps the component's logical roles (`endpoint`,
//! `controller`, ...) to locators in that set, so a `dependencies.<role>`
//! configuration key can point a role at a different instance.

use crate::{ConfigParams, RpcError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased registry of shared collaborators.
#[derive(Default, Clone)]
pub struct References {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `locator`, replacing any previous entry.
    ///
    /// Trait objects are stored as they are given, e.g. `Arc<dyn Commandable>`,
    /// and must be looked up with the same type.
    pub fn put<T: ?Sized + Send + Sync + 'static>(&mut self, locator: impl Into<String>, value: Arc<T>) {
        self.entries.insert(locator.into(), Arc::new(value));
    }

    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, locator: impl Into<String>, value: Arc<T>) -> Self {
        self.put(locator, value);
        self
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, locator: &str) -> Option<Arc<T>> {
        self.entries
            .get(locator)
            .and_then(|entry| entry.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn remove(&mut self, locator: &str) -> bool {
        self.entries.remove(locator).is_some()
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.entries.contains_key(locator)
    }
}

/// Resolves logical roles against `References`.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    locators: HashMap<String, String>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a role with its default locator.
    pub fn with_default(mut self, role: &str, locator: &str) -> Self {
        self.locators.insert(role.to_string(), locator.to_string());
        self
    }

    /// Apply `dependencies.<role> = <locator>` overrides.
    pub fn configure(&mut self, config: &ConfigParams) {
        for (role, locator) in config.get_section("dependencies").iter() {
            self.locators.insert(role.clone(), locator.clone());
        }
    }

    pub fn locator<'a>(&'a self, role: &'a str) -> &'a str {
        self.locators.get(role).map(String::as_str).unwrap_or(role)
    }

    pub fn get_optional<T: ?Sized + Send + Sync + 'static>(&self, refs: &References, role: &str) -> Option<Arc<T>> {
        refs.get::<T>(self.locator(role))
    }

    pub fn get_required<T: ?Sized + Send + Sync + 'static>(
        &self,
        refs: &References,
        role: &str,
    ) -> Result<Arc<T>, RpcError> {
        self.get_optional(refs, role).ok_or_else(|| {
            RpcError::invalid_state(
                None,
                "REFERENCE_NOT_FOUND",
                format!("Required dependency '{}' was not found", role),
            )
            .with_details("role", role)
            .with_details("locator", self.locator(role))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn test_trait_objects_by_role() {
        let greeter: Arc<dyn Greeter> = Arc::new(Hello);
        let refs = References::new().with("controller", greeter);

        let resolver = DependencyResolver::new();
        let found = resolver.get_required::<dyn Greeter>(&refs, "controller").unwrap();
        assert_eq!(found.greet(), "hello");

        // Wrong type under the same locator is not a match
        assert!(resolver.get_optional::<String>(&refs, "controller").is_none());
    }

    #[test]
    fn test_configured_locator_override() {
        let refs = References::new()
            .with("endpoint", Arc::new("default".to_string()))
            .with("shared-endpoint", Arc::new("shared".to_string()));

        let mut resolver = DependencyResolver::new();
        resolver.configure(&ConfigParams::from_tuples([("dependencies.endpoint", "shared-endpoint")]));

        let found = resolver.get_optional::<String>(&refs, "endpoint").unwrap();
        assert_eq!(found.as_str(), "shared");
    }

    #[test]
    fn test_missing_required_is_invalid_state() {
        let err = DependencyResolver::new()
            .get_required::<String>(&References::new(), "controller")
            .unwrap_err();
        assert_eq!(err.code, "REFERENCE_NOT_FOUND");
        assert_eq!(err.detail("role"), Some("controller"));
    }
}
