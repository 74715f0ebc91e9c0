//! Fluent, scope-accumulating feature queries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::engine::{by_scope, FeatureBatch, ResolutionEngine};
use crate::error::{FeatureError, Result};
use crate::scope::{FeatureScope, Scope};

/// One feature name or a collection of them.
pub trait FeatureNames {
    fn into_names(self) -> Vec<String>;
}

impl FeatureNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl FeatureNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl FeatureNames for &String {
    fn into_names(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>> FeatureNames for Vec<S> {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> FeatureNames for &[S] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> FeatureNames for [S; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

fn is_active(value: &Value) -> bool {
    *value != Value::Bool(false)
}

/// A request against one store for a set of scopes.
///
/// Scopes are added with [`Self::for_scope`]. Without any, queries run
/// against the default scope (the global scope unless configured).
#[derive(Clone)]
pub struct PendingScopedFeatureInteraction {
    engine: Arc<ResolutionEngine>,
    scopes: Vec<Scope>,
    default_scope: Scope,
}

impl PendingScopedFeatureInteraction {
    pub fn new(engine: Arc<ResolutionEngine>) -> Self {
        Self {
            engine,
            scopes: Vec::new(),
            default_scope: Scope::Global,
        }
    }

    /// Scope used when no scope was added.
    pub fn with_default_scope(mut self, scope: Scope) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn for_scope(mut self, scope: impl FeatureScope) -> Self {
        self.scopes.push(scope.to_feature_scope());
        self
    }

    pub fn for_scopes<I>(mut self, scopes: I) -> Self
    where
        I: IntoIterator,
        I::Item: FeatureScope,
    {
        self.scopes
            .extend(scopes.into_iter().map(|scope| scope.to_feature_scope()));
        self
    }

    /// The accumulated scopes, or the default scope when none were added.
    pub fn scopes(&self) -> Vec<Scope> {
        if self.scopes.is_empty() {
            vec![self.default_scope.clone()]
        } else {
            self.scopes.clone()
        }
    }

    pub fn engine(&self) -> &Arc<ResolutionEngine> {
        &self.engine
    }

    /// Resolve and return the values of the features for every scope.
    pub fn load(&self, features: impl FeatureNames) -> Result<FeatureBatch> {
        self.engine.get_all(&features.into_names(), &self.scopes())
    }

    /// Resolve only the pairs that have never been stored.
    pub fn load_missing(&self, features: impl FeatureNames) -> Result<FeatureBatch> {
        self.engine
            .get_all_missing(&features.into_names(), &self.scopes())
    }

    pub fn value(&self, feature: &str) -> Result<Value> {
        let mut values = self.values(feature)?;
        Ok(values.remove(feature).unwrap_or(Value::Bool(false)))
    }

    /// Values of the features for the single accumulated scope, keyed and
    /// sorted by feature name. Use [`Self::load`] for request order.
    pub fn values(&self, features: impl FeatureNames) -> Result<BTreeMap<String, Value>> {
        let scopes = self.scopes();
        if scopes.len() > 1 {
            return Err(FeatureError::MultipleScopes(scopes.len()));
        }

        let batch = self.engine.get_all(&features.into_names(), &scopes)?;
        Ok(batch
            .into_iter()
            .map(|(feature, values)| {
                let value = values.into_iter().next().unwrap_or(Value::Bool(false));
                (feature, value)
            })
            .collect())
    }

    /// Values of every defined feature for the single accumulated scope.
    pub fn all(&self) -> Result<BTreeMap<String, Value>> {
        let defined = self.engine.defined()?;
        self.values(defined)
    }

    pub fn active(&self, feature: &str) -> Result<bool> {
        self.all_are_active(feature)
    }

    /// Every feature is active for every scope.
    pub fn all_are_active(&self, features: impl FeatureNames) -> Result<bool> {
        let batch = self.load(features)?;
        let active = batch.iter().all(|(_, values)| values.iter().all(is_active));
        Ok(active)
    }

    /// For every scope, at least one of the features is active.
    pub fn some_are_active(&self, features: impl FeatureNames) -> Result<bool> {
        let scopes = self.scopes();
        let batch = self.engine.get_all(&features.into_names(), &scopes)?;
        let active = by_scope(&batch, scopes.len())
            .iter()
            .all(|values| values.iter().any(|value| is_active(value)));
        Ok(active)
    }

    pub fn inactive(&self, feature: &str) -> Result<bool> {
        self.all_are_inactive(feature)
    }

    /// Every feature is inactive for every scope.
    pub fn all_are_inactive(&self, features: impl FeatureNames) -> Result<bool> {
        let batch = self.load(features)?;
        let inactive = batch
            .iter()
            .all(|(_, values)| values.iter().all(|value| !is_active(value)));
        Ok(inactive)
    }

    /// For every scope, at least one of the features is inactive.
    pub fn some_are_inactive(&self, features: impl FeatureNames) -> Result<bool> {
        let scopes = self.scopes();
        let batch = self.engine.get_all(&features.into_names(), &scopes)?;
        let inactive = by_scope(&batch, scopes.len())
            .iter()
            .all(|values| values.iter().any(|value| !is_active(value)));
        Ok(inactive)
    }

    /// Run `on_active` with the feature's value when it is active.
    pub fn when<R>(
        &self,
        feature: &str,
        on_active: impl FnOnce(Value, &Self) -> R,
    ) -> Result<Option<R>> {
        let value = self.value(feature)?;
        Ok(is_active(&value).then(|| on_active(value, self)))
    }

    /// Run `on_active` or `on_inactive` depending on the feature.
    pub fn when_or<R>(
        &self,
        feature: &str,
        on_active: impl FnOnce(Value, &Self) -> R,
        on_inactive: impl FnOnce(Value, &Self) -> R,
    ) -> Result<R> {
        let value = self.value(feature)?;
        if is_active(&value) {
            Ok(on_active(value, self))
        } else {
            Ok(on_inactive(value, self))
        }
    }

    /// Run `on_inactive` with the feature's value when it is inactive.
    pub fn unless<R>(
        &self,
        feature: &str,
        on_inactive: impl FnOnce(Value, &Self) -> R,
    ) -> Result<Option<R>> {
        let value = self.value(feature)?;
        Ok((!is_active(&value)).then(|| on_inactive(value, self)))
    }

    pub fn unless_or<R>(
        &self,
        feature: &str,
        on_inactive: impl FnOnce(Value, &Self) -> R,
        on_active: impl FnOnce(Value, &Self) -> R,
    ) -> Result<R> {
        self.when_or(feature, on_active, on_inactive)
    }

    pub fn activate(&self, features: impl FeatureNames) -> Result<()> {
        self.activate_with(features, Value::Bool(true))
    }

    /// Store `value` for every feature and scope.
    pub fn activate_with(&self, features: impl FeatureNames, value: Value) -> Result<()> {
        self.set_each(features, &value)
    }

    pub fn deactivate(&self, features: impl FeatureNames) -> Result<()> {
        self.set_each(features, &Value::Bool(false))
    }

    /// Delete the stored value of every feature and scope.
    pub fn forget(&self, features: impl FeatureNames) -> Result<()> {
        let scopes = self.scopes();
        for feature in features.into_names() {
            for scope in &scopes {
                self.engine.delete(&feature, scope)?;
            }
        }
        Ok(())
    }

    fn set_each(&self, features: impl FeatureNames, value: &Value) -> Result<()> {
        let scopes = self.scopes();
        for feature in features.into_names() {
            for scope in &scopes {
                self.engine.set(&feature, scope, value)?;
            }
        }
        Ok(())
    }
}
