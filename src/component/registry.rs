//! Registry of component bindings by model name.
//!
//! Epistemic foundation:
//! - K_i: Every binding implements `ComponentFactory`
//! - K_i: "simple_loop" is always available
//! - I^R: User configures which model the run evaluates

use super::{ComponentFactory, SimpleLoopFactory};
use crate::models::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of component factories.
///
/// Thread-safe: all factories are wrapped in `Arc` for shared access by the
/// worker pool.
///
/// # Example
///
/// ```ignore
/// use nlsgen::ComponentRegistry;
///
/// let mut registry = ComponentRegistry::new();
/// registry.register("my_fmu", Arc::new(MyFmuFactory::load("model.fmu")?));
///
/// let factory = registry.resolve("my_fmu")?;
/// ```
pub struct ComponentRegistry {
    factories: HashMap<String, Arc<dyn ComponentFactory>>,
}

impl ComponentRegistry {
    /// Registry with the built-in reference components.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("simple_loop", Arc::new(SimpleLoopFactory));
        registry
    }

    /// Register (or replace) a factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn ComponentFactory>) {
        let name = name.into();
        debug!(model = %name, "Registered component factory");
        self.factories.insert(name, factory);
    }

    /// Get a factory by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.get(name).cloned()
    }

    /// Get a factory by name or fail with a configuration error.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ComponentFactory>, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))
    }

    /// Registered model names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_loop_is_registered_by_default() {
        let registry = ComponentRegistry::new();
        assert!(registry.get("simple_loop").is_some());
        assert_eq!(registry.names(), vec!["simple_loop"]);
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let registry = ComponentRegistry::new();
        assert!(matches!(
            registry.resolve("furnace"),
            Err(ConfigError::UnknownModel(ref m)) if m == "furnace"
        ));
    }

    #[test]
    fn test_register_custom_factory() {
        let mut registry = ComponentRegistry::new();
        registry.register("loop_copy", Arc::new(SimpleLoopFactory));
        assert_eq!(registry.names(), vec!["loop_copy", "simple_loop"]);
    }
}
