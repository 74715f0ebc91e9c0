//! The resolution engine.
//!
//! Given a set of features and a set of scopes, the engine reads every
//! (feature, scope) pair from the driver in one bulk call, resolves the
//! pairs that have never been stored, writes those back, and hands the
//! merged values to the caller in request order.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::drivers::{Driver, FeatureKey};
use crate::error::{FeatureError, Result};
use crate::resolver::ResolverRegistry;
use crate::scope::Scope;

/// What to do with a feature that has neither a resolver nor a stored value
/// for any scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFeaturePolicy {
    /// Fail with [`FeatureError::UndefinedFeature`].
    #[default]
    Strict,
    /// Treat the feature as inactive without storing anything.
    Inactive,
}

/// Values per feature, in request order. Each list follows scope order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBatch {
    entries: Vec<(String, Vec<Value>)>,
}

impl FeatureBatch {
    pub fn get(&self, feature: &str) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(name, _)| name == feature)
            .map(|(_, values)| values.as_slice())
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for FeatureBatch {
    type Item = (String, Vec<Value>);
    type IntoIter = std::vec::IntoIter<(String, Vec<Value>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Resolves and caches feature values on top of a storage driver.
pub struct ResolutionEngine {
    name: String,
    driver: Arc<dyn Driver>,
    registry: Arc<ResolverRegistry>,
    unknown_features: UnknownFeaturePolicy,
}

impl ResolutionEngine {
    pub fn new(
        name: impl Into<String>,
        driver: Arc<dyn Driver>,
        registry: Arc<ResolverRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            driver,
            registry,
            unknown_features: UnknownFeaturePolicy::default(),
        }
    }

    pub fn with_unknown_features(mut self, policy: UnknownFeaturePolicy) -> Self {
        self.unknown_features = policy;
        self
    }

    /// Name of the store this engine serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Values of every feature for every scope, resolving what is missing.
    pub fn get_all(&self, features: &[String], scopes: &[Scope]) -> Result<FeatureBatch> {
        self.load_batch(features, scopes, false)
    }

    /// Like [`Self::get_all`], but only returns pairs that had no stored
    /// value before the call. Features without such pairs are left out.
    pub fn get_all_missing(&self, features: &[String], scopes: &[Scope]) -> Result<FeatureBatch> {
        self.load_batch(features, scopes, true)
    }

    pub fn get(&self, feature: &str, scope: &Scope) -> Result<Value> {
        let batch = self.get_all(&[feature.to_string()], std::slice::from_ref(scope))?;
        Ok(batch
            .into_iter()
            .next()
            .and_then(|(_, values)| values.into_iter().next())
            .unwrap_or(Value::Bool(false)))
    }

    /// The stored value of a pair, without resolving it.
    pub fn stored_value(&self, feature: &str, scope: &Scope) -> Result<Option<Value>> {
        self.driver.get(feature, &scope.key()?)
    }

    pub fn set(&self, feature: &str, scope: &Scope, value: &Value) -> Result<()> {
        let key = scope.key()?;
        tracing::debug!(store = %self.name, feature, scope = %key, "Setting feature value");
        self.driver.set(feature, &key, value)
    }

    pub fn delete(&self, feature: &str, scope: &Scope) -> Result<()> {
        let key = scope.key()?;
        tracing::debug!(store = %self.name, feature, scope = %key, "Forgetting feature value");
        self.driver.delete(feature, &key)
    }

    /// Overwrite the value of a feature for every scope it is stored for.
    pub fn set_for_all_scopes(&self, feature: &str, value: &Value) -> Result<()> {
        self.driver.set_for_all_scopes(feature, value)
    }

    pub fn purge(&self, features: Option<&[String]>) -> Result<()> {
        tracing::debug!(store = %self.name, ?features, "Purging features");
        self.driver.purge(features)
    }

    /// Features with a resolver or at least one stored value, sorted.
    pub fn defined(&self) -> Result<Vec<String>> {
        let mut names = self.registry.names();
        names.extend(self.driver.defined()?);
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Features with at least one stored value.
    pub fn stored(&self) -> Result<Vec<String>> {
        self.driver.defined()
    }

    fn load_batch(
        &self,
        features: &[String],
        scopes: &[Scope],
        only_missing: bool,
    ) -> Result<FeatureBatch> {
        if features.is_empty() || scopes.is_empty() {
            let entries = if only_missing {
                Vec::new()
            } else {
                features.iter().map(|f| (f.clone(), Vec::new())).collect()
            };
            return Ok(FeatureBatch { entries });
        }

        let scope_keys = scopes.iter().map(Scope::key).collect::<Result<Vec<_>>>()?;
        let keys = cross_join(features, &scope_keys);

        let mut values = self.driver.get_all(&keys)?;

        let mut missing = HashSet::new();
        let mut resolved = Vec::new();
        let mut unknown = Vec::new();
        // Names with any stored value, read only once a pair has no resolver.
        let mut stored_names: Option<HashSet<String>> = None;

        for (index, key) in keys.iter().enumerate() {
            if values.contains_key(key) || !missing.insert(key.clone()) {
                continue;
            }
            let scope = &scopes[index % scopes.len()];

            match self.registry.get(&key.feature) {
                Some(resolver) => {
                    let value =
                        resolver
                            .resolve(scope)
                            .map_err(|source| FeatureError::Resolver {
                                feature: key.feature.clone(),
                                source,
                            })?;
                    tracing::debug!(
                        store = %self.name,
                        feature = %key.feature,
                        scope = %key.scope,
                        "Resolved feature"
                    );
                    resolved.push((key.clone(), value));
                }
                None => {
                    if stored_names.is_none() {
                        stored_names = Some(self.driver.defined()?.into_iter().collect());
                    }
                    let stored_elsewhere = stored_names
                        .as_ref()
                        .is_some_and(|names| names.contains(&key.feature));

                    if !stored_elsewhere {
                        if self.unknown_features == UnknownFeaturePolicy::Strict {
                            return Err(FeatureError::UndefinedFeature(key.feature.clone()));
                        }
                        tracing::warn!(
                            store = %self.name,
                            feature = %key.feature,
                            "Unknown feature resolved as inactive"
                        );
                    }
                    unknown.push((key.clone(), Value::Bool(false)));
                }
            }
        }

        tracing::debug!(
            store = %self.name,
            pairs = keys.len(),
            hits = keys.len() - missing.len(),
            resolved = resolved.len(),
            "Loaded feature batch"
        );

        values.extend(self.driver.insert_missing(&resolved)?);
        values.extend(unknown);

        let mut entries = Vec::with_capacity(features.len());
        let mut pairs = keys.iter();
        for feature in features {
            let mut feature_values = Vec::with_capacity(scopes.len());
            for key in pairs.by_ref().take(scopes.len()) {
                if only_missing && !missing.contains(key) {
                    continue;
                }
                feature_values.push(values.get(key).cloned().unwrap_or(Value::Bool(false)));
            }
            if only_missing && feature_values.is_empty() {
                continue;
            }
            entries.push((feature.clone(), feature_values));
        }

        Ok(FeatureBatch { entries })
    }
}

/// Every (feature, scope key) pair, features outer and scopes inner.
pub fn cross_join(features: &[String], scope_keys: &[String]) -> Vec<FeatureKey> {
    let mut keys = Vec::with_capacity(features.len() * scope_keys.len());
    for feature in features {
        for scope in scope_keys {
            keys.push(FeatureKey::new(feature.as_str(), scope.as_str()));
        }
    }
    keys
}

/// Group values of a batch by scope index: `result[scope][feature]`.
pub(crate) fn by_scope(batch: &FeatureBatch, scope_count: usize) -> Vec<Vec<&Value>> {
    let mut grouped: Vec<Vec<&Value>> = vec![Vec::new(); scope_count];
    for (_, values) in batch.iter() {
        for (scope, value) in values.iter().enumerate() {
            grouped[scope].push(value);
        }
    }
    grouped
}
