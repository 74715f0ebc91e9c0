//! Storage drivers.
//!
//! A driver is the only owner of durable feature state. The engine talks to
//! it through the narrow [`Driver`] contract, keyed by feature name and
//! normalized scope key.

mod database;
mod memory;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::Result;

pub use database::DatabaseDriver;
pub use memory::MemoryDriver;

/// A (feature, scope key) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureKey {
    pub feature: String,
    pub scope: String,
}

impl FeatureKey {
    pub fn new(feature: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            scope: scope.into(),
        }
    }
}

/// Storage backend for resolved feature values.
///
/// Implementations must be safe to share between threads.
pub trait Driver: Send + Sync {
    /// Read a single stored value.
    fn get(&self, feature: &str, scope: &str) -> Result<Option<Value>>;

    /// Read many stored values in one round trip to the backing store.
    ///
    /// Keys without a stored value are absent from the returned map.
    fn get_all(&self, keys: &[FeatureKey]) -> Result<HashMap<FeatureKey, Value>>;

    /// Store a value, overwriting whatever was there.
    fn set(&self, feature: &str, scope: &str, value: &Value) -> Result<()>;

    /// Store freshly resolved values without overwriting existing ones.
    ///
    /// Returns the value that ends up stored for every given key, which is
    /// the pre-existing one when another writer got there first.
    fn insert_missing(
        &self,
        entries: &[(FeatureKey, Value)],
    ) -> Result<HashMap<FeatureKey, Value>>;

    /// Remove a stored value. Removing an absent value is not an error.
    fn delete(&self, feature: &str, scope: &str) -> Result<()>;

    /// Overwrite the value of every stored scope of a feature.
    fn set_for_all_scopes(&self, feature: &str, value: &Value) -> Result<()>;

    /// Delete every stored value of the given features, or of all features.
    fn purge(&self, features: Option<&[String]>) -> Result<()>;

    /// Names of all features with at least one stored value, sorted.
    fn defined(&self) -> Result<Vec<String>>;
}
