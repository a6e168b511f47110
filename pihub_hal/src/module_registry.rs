//! Module registry.
//!
//! Maps a driver-kind name (the `source` of an initialize spec) to the
//! constructor for that driver. The set of drivers is fixed at build time;
//! only the lookup happens at runtime.

use crate::drivers::register_builtin_modules;
use pihub_common::error::ModuleError;
use pihub_common::module::{Module, ModuleFactory};
use std::collections::HashMap;

/// Registry of available driver kinds.
///
/// Constructed at startup, populated via `register()`, and handed to the
/// `ModuleManager` by value. No global state.
pub struct ModuleRegistry {
    factories: HashMap<&'static str, ModuleFactory>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in driver kind.
    pub fn with_builtin_modules() -> Self {
        let mut registry = Self::new();
        register_builtin_modules(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, source: &'static str, factory: ModuleFactory) {
        if self.factories.contains_key(source) {
            panic!("Module source '{source}' is already registered");
        }
        self.factories.insert(source, factory);
    }

    /// Get a driver factory by name.
    pub fn get_factory(&self, source: &str) -> Option<ModuleFactory> {
        self.factories.get(source).copied()
    }

    /// Construct a fresh, uninitialized instance of `source`.
    ///
    /// # Errors
    /// Returns `ModuleError::UnknownSource` if `source` is not registered.
    pub fn create_module(&self, source: &str) -> Result<Box<dyn Module>, ModuleError> {
        let factory = self
            .get_factory(source)
            .ok_or_else(|| ModuleError::UnknownSource(source.to_string()))?;
        Ok(factory())
    }

    /// All registered driver names, sorted.
    pub fn list_sources(&self) -> Vec<&'static str> {
        let mut sources: Vec<_> = self.factories.keys().copied().collect();
        sources.sort_unstable();
        sources
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pihub_common::binder::ConfigBinder;
    use pihub_common::resources::ResourceProvider;
    use serde_json::Value;

    struct TestModule;

    impl Module for TestModule {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn initialize(
            &mut self,
            _resources: &ResourceProvider,
            _config: &ConfigBinder<'_>,
        ) -> Result<(), ModuleError> {
            Ok(())
        }

        fn act(&mut self, action: &str, _request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
            Err(ModuleError::unknown_action(action))
        }

        fn stop(&mut self) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn create_test_module() -> Box<dyn Module> {
        Box::new(TestModule)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = ModuleRegistry::new();
        reg.register("test_module", create_test_module);

        let module = reg.create_module("test_module").expect("should create");
        assert_eq!(module.kind(), "test");
    }

    #[test]
    fn registry_unknown_source() {
        let reg = ModuleRegistry::new();
        let result = reg.create_module("bogus");
        assert!(matches!(result, Err(ModuleError::UnknownSource(ref s)) if s == "bogus"));
    }

    #[test]
    fn registry_list_sources() {
        let mut reg = ModuleRegistry::new();
        reg.register("beta", create_test_module);
        reg.register("alpha", create_test_module);

        assert_eq!(reg.list_sources(), vec!["alpha", "beta"]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = ModuleRegistry::new();
        reg.register("dup", create_test_module);
        reg.register("dup", create_test_module);
    }

    #[test]
    fn registry_builtin_sources() {
        let reg = ModuleRegistry::with_builtin_modules();
        for source in ["echo", "relay", "i2c", "ads", "htg3535ch", "am2301", "servo", "hcsr04"] {
            let module = reg.create_module(source).expect("builtin module");
            assert_eq!(module.kind(), source);
        }
    }
}
