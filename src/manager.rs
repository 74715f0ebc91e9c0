//! Entry point tying configuration, stores and resolvers together.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use crate::access::{AccessControl, Gate};
use crate::config::{FlagpoleConfig, StoreConfig};
use crate::drivers::{DatabaseDriver, Driver, MemoryDriver};
use crate::engine::{FeatureBatch, ResolutionEngine};
use crate::error::{FeatureError, Result};
use crate::interaction::{FeatureNames, PendingScopedFeatureInteraction};
use crate::resolver::{FeatureDefinition, ResolverRegistry};
use crate::scope::{FeatureScope, Scope};

type DefaultScopeFn = dyn Fn() -> Scope + Send + Sync;

/// Owns the named stores and the resolver registry they share.
///
/// Stores are opened lazily on first use. Methods without an explicit store
/// run against the configured default store.
pub struct FeatureManager {
    config: FlagpoleConfig,
    registry: Arc<ResolverRegistry>,
    stores: Mutex<HashMap<String, Arc<ResolutionEngine>>>,
    default_scope: RwLock<Option<Arc<DefaultScopeFn>>>,
}

impl FeatureManager {
    pub fn new(config: FlagpoleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(ResolverRegistry::new()),
            stores: Mutex::new(HashMap::new()),
            default_scope: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &FlagpoleConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    /// The engine for a named store, opening it on first use.
    pub fn store(&self, name: &str) -> Result<Arc<ResolutionEngine>> {
        let mut stores = self.stores.lock().expect("store cache lock poisoned");
        if let Some(engine) = stores.get(name) {
            return Ok(engine.clone());
        }

        let store_config = self
            .config
            .stores
            .get(name)
            .ok_or_else(|| FeatureError::UnknownStore(name.to_string()))?;
        let driver = open_driver(store_config)?;
        tracing::debug!(store = name, "Opened feature store");

        let engine = Arc::new(
            ResolutionEngine::new(name, driver, self.registry.clone())
                .with_unknown_features(self.config.unknown_features),
        );
        stores.insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    pub fn default_store(&self) -> Result<Arc<ResolutionEngine>> {
        self.store(&self.config.default_store)
    }

    /// Register a closure resolver.
    pub fn define<F>(&self, feature: impl Into<String>, resolver: F)
    where
        F: Fn(&Scope) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.registry.define(feature, resolver);
    }

    pub fn define_value(&self, feature: impl Into<String>, value: Value) {
        self.registry.define_value(feature, value);
    }

    pub fn define_feature(&self, definition: impl FeatureDefinition + 'static) {
        self.registry.define_feature(definition);
    }

    /// Resolve the scope used when a query names none.
    pub fn resolve_scope_using<F>(&self, resolver: F)
    where
        F: Fn() -> Scope + Send + Sync + 'static,
    {
        let resolver: Arc<DefaultScopeFn> = Arc::new(resolver);
        *self
            .default_scope
            .write()
            .expect("default scope lock poisoned") = Some(resolver);
    }

    fn default_scope(&self) -> Scope {
        let resolver = self
            .default_scope
            .read()
            .expect("default scope lock poisoned")
            .clone();
        resolver.map(|resolve| resolve()).unwrap_or(Scope::Global)
    }

    /// A new interaction against the default store.
    pub fn interaction(&self) -> Result<PendingScopedFeatureInteraction> {
        self.interaction_on(&self.config.default_store)
    }

    /// A new interaction against a named store.
    pub fn interaction_on(&self, store: &str) -> Result<PendingScopedFeatureInteraction> {
        Ok(PendingScopedFeatureInteraction::new(self.store(store)?)
            .with_default_scope(self.default_scope()))
    }

    pub fn for_scope(&self, scope: impl FeatureScope) -> Result<PendingScopedFeatureInteraction> {
        Ok(self.interaction()?.for_scope(scope))
    }

    pub fn for_scopes<I>(&self, scopes: I) -> Result<PendingScopedFeatureInteraction>
    where
        I: IntoIterator,
        I::Item: FeatureScope,
    {
        Ok(self.interaction()?.for_scopes(scopes))
    }

    pub fn active(&self, feature: &str) -> Result<bool> {
        self.interaction()?.active(feature)
    }

    pub fn inactive(&self, feature: &str) -> Result<bool> {
        self.interaction()?.inactive(feature)
    }

    pub fn value(&self, feature: &str) -> Result<Value> {
        self.interaction()?.value(feature)
    }

    pub fn values(&self, features: impl FeatureNames) -> Result<BTreeMap<String, Value>> {
        self.interaction()?.values(features)
    }

    pub fn all(&self) -> Result<BTreeMap<String, Value>> {
        self.interaction()?.all()
    }

    pub fn activate(&self, features: impl FeatureNames) -> Result<()> {
        self.interaction()?.activate(features)
    }

    pub fn activate_with(&self, features: impl FeatureNames, value: Value) -> Result<()> {
        self.interaction()?.activate_with(features, value)
    }

    pub fn deactivate(&self, features: impl FeatureNames) -> Result<()> {
        self.interaction()?.deactivate(features)
    }

    pub fn forget(&self, features: impl FeatureNames) -> Result<()> {
        self.interaction()?.forget(features)
    }

    pub fn load(&self, features: impl FeatureNames) -> Result<FeatureBatch> {
        self.interaction()?.load(features)
    }

    pub fn load_missing(&self, features: impl FeatureNames) -> Result<FeatureBatch> {
        self.interaction()?.load_missing(features)
    }

    /// Set the feature to `true` for every scope that has a stored value.
    pub fn activate_for_everyone(&self, features: impl FeatureNames) -> Result<()> {
        let store = self.default_store()?;
        for feature in features.into_names() {
            store.set_for_all_scopes(&feature, &Value::Bool(true))?;
        }
        Ok(())
    }

    /// Set the feature to `false` for every scope that has a stored value.
    pub fn deactivate_for_everyone(&self, features: impl FeatureNames) -> Result<()> {
        let store = self.default_store()?;
        for feature in features.into_names() {
            store.set_for_all_scopes(&feature, &Value::Bool(false))?;
        }
        Ok(())
    }

    /// Delete every stored value of the features, or of all features.
    pub fn purge(&self, features: Option<&[String]>) -> Result<()> {
        self.default_store()?.purge(features)
    }

    pub fn defined(&self) -> Result<Vec<String>> {
        self.default_store()?.defined()
    }

    pub fn stored(&self) -> Result<Vec<String>> {
        self.default_store()?.stored()
    }

    pub fn access_control(&self, gate: Arc<dyn Gate>) -> AccessControl {
        AccessControl::new(gate, self.config.subscribe.clone())
    }
}

fn open_driver(config: &StoreConfig) -> Result<Arc<dyn Driver>> {
    match config {
        StoreConfig::Memory { shared: true } => Ok(Arc::new(MemoryDriver::shared())),
        StoreConfig::Memory { shared: false } => Ok(Arc::new(MemoryDriver::new())),
        StoreConfig::Database { path } => {
            let driver = match path {
                Some(path) => DatabaseDriver::open(path.clone())?,
                None => DatabaseDriver::open_default()?,
            };
            driver.migrate()?;
            Ok(Arc::new(driver))
        }
    }
}
