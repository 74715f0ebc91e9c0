use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use serde_json::Value;

use super::{Driver, FeatureKey};
use crate::error::Result;

type Values = HashMap<FeatureKey, Value>;

static SHARED: OnceLock<Arc<Mutex<Values>>> = OnceLock::new();

/// In-memory driver backed by a mutex-guarded map.
///
/// Values live as long as the process. Cloned handles share the same map.
/// Not a substitute for [`super::DatabaseDriver`] when several processes
/// need to agree on feature values.
#[derive(Default)]
pub struct MemoryDriver {
    values: Arc<Mutex<Values>>,
}

impl MemoryDriver {
    /// A driver with its own empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the process-wide map, created empty on first use.
    pub fn shared() -> Self {
        Self {
            values: SHARED.get_or_init(Default::default).clone(),
        }
    }

    /// Number of stored (feature, scope) pairs.
    pub fn len(&self) -> usize {
        self.values.lock().expect("feature store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for MemoryDriver {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
        }
    }
}

impl Driver for MemoryDriver {
    fn get(&self, feature: &str, scope: &str) -> Result<Option<Value>> {
        let values = self.values.lock().expect("feature store lock poisoned");
        Ok(values.get(&FeatureKey::new(feature, scope)).cloned())
    }

    fn get_all(&self, keys: &[FeatureKey]) -> Result<HashMap<FeatureKey, Value>> {
        let values = self.values.lock().expect("feature store lock poisoned");
        Ok(keys
            .iter()
            .filter_map(|key| values.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    fn set(&self, feature: &str, scope: &str, value: &Value) -> Result<()> {
        let mut values = self.values.lock().expect("feature store lock poisoned");
        values.insert(FeatureKey::new(feature, scope), value.clone());
        Ok(())
    }

    fn insert_missing(
        &self,
        entries: &[(FeatureKey, Value)],
    ) -> Result<HashMap<FeatureKey, Value>> {
        let mut values = self.values.lock().expect("feature store lock poisoned");
        Ok(entries
            .iter()
            .map(|(key, value)| {
                let stored = values.entry(key.clone()).or_insert_with(|| value.clone());
                (key.clone(), stored.clone())
            })
            .collect())
    }

    fn delete(&self, feature: &str, scope: &str) -> Result<()> {
        let mut values = self.values.lock().expect("feature store lock poisoned");
        values.remove(&FeatureKey::new(feature, scope));
        Ok(())
    }

    fn set_for_all_scopes(&self, feature: &str, value: &Value) -> Result<()> {
        let mut values = self.values.lock().expect("feature store lock poisoned");
        for (_, stored) in values.iter_mut().filter(|(key, _)| key.feature == feature) {
            *stored = value.clone();
        }
        Ok(())
    }

    fn purge(&self, features: Option<&[String]>) -> Result<()> {
        let mut values = self.values.lock().expect("feature store lock poisoned");
        match features {
            Some(features) => values.retain(|key, _| !features.contains(&key.feature)),
            None => values.clear(),
        }
        Ok(())
    }

    fn defined(&self) -> Result<Vec<String>> {
        let values = self.values.lock().expect("feature store lock poisoned");
        let names: BTreeSet<&String> = values.keys().map(|key| &key.feature).collect();
        Ok(names.into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_missing_keeps_existing_values() {
        let driver = MemoryDriver::new();
        driver.set("beta", "user|1", &json!("blue")).unwrap();

        let stored = driver
            .insert_missing(&[
                (FeatureKey::new("beta", "user|1"), json!("red")),
                (FeatureKey::new("beta", "user|2"), json!("red")),
            ])
            .unwrap();

        assert_eq!(stored[&FeatureKey::new("beta", "user|1")], json!("blue"));
        assert_eq!(stored[&FeatureKey::new("beta", "user|2")], json!("red"));
    }

    #[test]
    fn test_clones_share_state() {
        let driver = MemoryDriver::new();
        let other = driver.clone();
        driver.set("beta", "user|1", &json!(true)).unwrap();

        assert_eq!(other.get("beta", "user|1").unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_purge_only_named_features() {
        let driver = MemoryDriver::new();
        driver.set("a", "x", &json!(true)).unwrap();
        driver.set("b", "x", &json!(true)).unwrap();

        driver.purge(Some(&["a".to_string()][..])).unwrap();

        assert_eq!(driver.defined().unwrap(), vec!["b".to_string()]);
    }
}
