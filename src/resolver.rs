//! Feature definitions and the registry that dispatches to them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{FeatureError, Result};
use crate::scope::Scope;

/// Resolver closure computing a feature's initial value for a scope.
pub type ResolverFn = dyn Fn(&Scope) -> anyhow::Result<Value> + Send + Sync;

/// A feature defined as a type rather than a closure.
///
/// Definitions take part in access-control checks (see
/// [`crate::access::AccessControl`]); closure resolvers do not.
pub trait FeatureDefinition: Send + Sync {
    fn name(&self) -> &str;

    fn resolve(&self, scope: &Scope) -> anyhow::Result<Value>;

    /// Gate-style authorization hook. `None` defers to the configured
    /// handler for the scope kind.
    fn authorize(&self, _scope: &Scope, _params: &Value) -> Option<bool> {
        None
    }
}

/// A registered resolver.
#[derive(Clone)]
pub enum Resolver {
    Closure(Arc<ResolverFn>),
    Definition(Arc<dyn FeatureDefinition>),
}

impl Resolver {
    pub fn resolve(&self, scope: &Scope) -> anyhow::Result<Value> {
        match self {
            Self::Closure(resolver) => resolver(scope),
            Self::Definition(definition) => definition.resolve(scope),
        }
    }

    pub fn definition(&self) -> Option<&Arc<dyn FeatureDefinition>> {
        match self {
            Self::Closure(_) => None,
            Self::Definition(definition) => Some(definition),
        }
    }
}

/// Maps feature names to resolvers. Holds no feature values.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: RwLock<HashMap<String, Resolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure resolver, replacing any previous one.
    pub fn define<F>(&self, feature: impl Into<String>, resolver: F)
    where
        F: Fn(&Scope) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(feature.into(), Resolver::Closure(Arc::new(resolver)));
    }

    /// Register a feature that resolves to the same value for every scope.
    pub fn define_value(&self, feature: impl Into<String>, value: Value) {
        self.define(feature, move |_| Ok(value.clone()));
    }

    /// Register a type-based feature under its own name.
    pub fn define_feature(&self, definition: impl FeatureDefinition + 'static) {
        let name = definition.name().to_string();
        self.insert(name, Resolver::Definition(Arc::new(definition)));
    }

    fn insert(&self, feature: String, resolver: Resolver) {
        tracing::debug!(feature = %feature, "Defining feature");
        self.resolvers
            .write()
            .expect("resolver registry lock poisoned")
            .insert(feature, resolver);
    }

    /// Look up a resolver. The returned handle is detached from the
    /// registry lock, so resolvers may call back into the engine.
    pub fn get(&self, feature: &str) -> Option<Resolver> {
        self.resolvers
            .read()
            .expect("resolver registry lock poisoned")
            .get(feature)
            .cloned()
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.resolvers
            .read()
            .expect("resolver registry lock poisoned")
            .contains_key(feature)
    }

    /// Invoke the resolver of a feature.
    pub fn resolve(&self, feature: &str, scope: &Scope) -> Result<Value> {
        let resolver = self
            .get(feature)
            .ok_or_else(|| FeatureError::UndefinedFeature(feature.to_string()))?;

        resolver
            .resolve(scope)
            .map_err(|source| FeatureError::Resolver {
                feature: feature.to_string(),
                source,
            })
    }

    /// Names of all registered features, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .resolvers
            .read()
            .expect("resolver registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Beta;

    impl FeatureDefinition for Beta {
        fn name(&self) -> &str {
            "beta"
        }

        fn resolve(&self, scope: &Scope) -> anyhow::Result<Value> {
            Ok(json!(scope.kind() == "user"))
        }
    }

    #[test]
    fn test_missing_resolver_is_undefined() {
        let registry = ResolverRegistry::new();
        let err = registry.resolve("nope", &Scope::Global).unwrap_err();
        assert!(matches!(err, FeatureError::UndefinedFeature(name) if name == "nope"));
    }

    #[test]
    fn test_definitions_register_under_their_name() {
        let registry = ResolverRegistry::new();
        registry.define_feature(Beta);

        assert!(registry.get("beta").unwrap().definition().is_some());
        assert_eq!(
            registry.resolve("beta", &Scope::entity("user", 1)).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_resolver_failures_are_wrapped() {
        let registry = ResolverRegistry::new();
        registry.define("broken", |_| anyhow::bail!("backend down"));

        let err = registry.resolve("broken", &Scope::Global).unwrap_err();
        assert!(matches!(err, FeatureError::Resolver { ref feature, .. } if feature == "broken"));
    }

    #[test]
    fn test_names_are_sorted() {
        let registry = ResolverRegistry::new();
        registry.define_value("zeta", json!(true));
        registry.define_value("alpha", json!(false));

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }
}
