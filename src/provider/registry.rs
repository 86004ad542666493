//! Registry of provider factories keyed by name.
//!
//! Keys are matched case-insensitively (`"fs"` and `"FS"` resolve to the same backend).
//! A registry only holds factories producing `Box<P>`, so a key can never resolve to a
//! backend of the wrong family.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::{Configure, IntoProvider};

type Factory<P> = Arc<dyn Fn(Value) -> Result<Box<P>, ProviderError> + Send + Sync>;

pub struct ProviderRegistry<P: ?Sized> {
    factories: HashMap<String, Factory<P>>,
}

impl<P: ?Sized + 'static> Default for ProviderRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized + 'static> ProviderRegistry<P> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a configurable backend under `key`.
    pub fn register<T>(self, key: &str) -> Self
    where
        T: Configure + IntoProvider<P> + 'static,
    {
        self.register_factory(key, |options| T::from_value(options).map(<T as IntoProvider<P>>::into_provider))
    }

    /// Register an arbitrary factory under `key`. A later registration replaces an
    /// earlier one with the same key.
    pub fn register_factory<F>(mut self, key: &str, factory: F) -> Self
    where
        F: Fn(Value) -> Result<Box<P>, ProviderError> + Send + Sync + 'static,
    {
        self.factories.insert(key.to_uppercase(), Arc::new(factory));
        self
    }

    /// Configure a fresh, unconnected instance of the backend registered under `key`.
    pub fn build(&self, key: &str, options: Value) -> Result<Box<P>, ProviderError> {
        let factory = self
            .factories
            .get(&key.to_uppercase())
            .ok_or_else(|| ProviderError::UnknownProvider(key.to_string()))?;
        factory(options)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(&key.to_uppercase())
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl<P: ?Sized> fmt::Debug for ProviderRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.factories.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ProviderRegistry").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct HelloOptions {
        name: String,
    }

    struct Hello(String);

    impl Greeter for Hello {
        fn greet(&self) -> String {
            format!("hello {}", self.0)
        }
    }

    impl Configure for Hello {
        type Options = HelloOptions;
        const NAME: &'static str = "hello";

        fn configure(options: HelloOptions) -> Result<Self, ProviderError> {
            Ok(Hello(options.name))
        }
    }

    impl IntoProvider<dyn Greeter> for Hello {
        fn into_provider(self) -> Box<dyn Greeter> {
            Box::new(self)
        }
    }

    fn registry() -> ProviderRegistry<dyn Greeter> {
        ProviderRegistry::new().register::<Hello>("HELLO")
    }

    #[test]
    fn keys_are_case_insensitive() {
        let registry = registry();
        assert!(registry.contains("hello"));
        let greeter = registry.build("Hello", serde_json::json!({ "name": "rex" })).unwrap();
        assert_eq!(greeter.greet(), "hello rex");
        assert_eq!(registry.keys(), vec!["HELLO"]);
    }

    #[test]
    fn unknown_key() {
        let result = registry().build("nope", Value::Null);
        assert!(matches!(result, Err(ProviderError::UnknownProvider(ref k)) if k == "nope"));
    }

    #[test]
    fn closed_options_are_enforced() {
        let result = registry().build("hello", serde_json::json!({ "name": "rex", "extra": 1 }));
        assert!(matches!(result, Err(ProviderError::InvalidOptions { provider: "hello", .. })));
        let result = registry().build("hello", Value::Null);
        assert!(matches!(result, Err(ProviderError::InvalidOptions { .. })));
    }
}
