mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use super::{Driver, FeatureKey};
use crate::error::{FeatureError, Result};

/// Upper bound of (name, scope) pairs bound into one statement.
///
/// Keeps every bulk read under SQLite's bound parameter limit.
const MAX_PAIRS_PER_QUERY: usize = 16_000;

/// SQLite driver storing one row per (feature, scope) pair.
pub struct DatabaseDriver {
    conn: Arc<Mutex<Connection>>,
}

impl DatabaseDriver {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path.parent().ok_or_else(|| {
            FeatureError::Config("Database path has no parent directory".to_string())
        })?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Location of the database when no path is configured.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "flagpole").ok_or_else(|| {
            FeatureError::Config("Could not determine data directory".to_string())
        })?;
        Ok(dirs.data_dir().join("flagpole.db"))
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }
}

impl Clone for DatabaseDriver {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl Driver for DatabaseDriver {
    fn get(&self, feature: &str, scope: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT value FROM features WHERE name = ? AND scope = ?")?;

        let mut rows = stmt.query([feature, scope])?;
        if let Some(row) = rows.next()? {
            Ok(Some(parse_value(&row.get::<_, String>(0)?)?))
        } else {
            Ok(None)
        }
    }

    fn get_all(&self, keys: &[FeatureKey]) -> Result<HashMap<FeatureKey, Value>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        fetch(&conn, keys)
    }

    fn set(&self, feature: &str, scope: &str, value: &Value) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO features (name, scope, value, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(name, scope) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            (feature, scope, serde_json::to_string(value)?, &now, &now),
        )?;

        Ok(())
    }

    fn insert_missing(
        &self,
        entries: &[(FeatureKey, Value)],
    ) -> Result<HashMap<FeatureKey, Value>> {
        if entries.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO features (name, scope, value, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(name, scope) DO NOTHING",
            )?;
            for (key, value) in entries {
                stmt.execute((
                    &key.feature,
                    &key.scope,
                    serde_json::to_string(value)?,
                    &now,
                    &now,
                ))?;
            }
        }

        let keys: Vec<FeatureKey> = entries.iter().map(|(key, _)| key.clone()).collect();
        let stored = fetch(&tx, &keys)?;
        tx.commit()?;

        Ok(stored)
    }

    fn delete(&self, feature: &str, scope: &str) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "DELETE FROM features WHERE name = ? AND scope = ?",
            [feature, scope],
        )?;
        Ok(())
    }

    fn set_for_all_scopes(&self, feature: &str, value: &Value) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE features SET value = ?, updated_at = ? WHERE name = ?",
            (serde_json::to_string(value)?, Utc::now().to_rfc3339(), feature),
        )?;
        Ok(())
    }

    fn purge(&self, features: Option<&[String]>) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        match features {
            None => {
                conn.execute("DELETE FROM features", [])?;
            }
            Some([]) => {}
            Some(features) => {
                let sql = format!(
                    "DELETE FROM features WHERE name IN ({})",
                    vec!["?"; features.len()].join(", ")
                );
                conn.execute(&sql, params_from_iter(features.iter()))?;
            }
        }
        Ok(())
    }

    fn defined(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT DISTINCT name FROM features ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

/// Bulk read with a row-value IN list, one statement per chunk.
fn fetch(conn: &Connection, keys: &[FeatureKey]) -> Result<HashMap<FeatureKey, Value>> {
    let mut found = HashMap::new();

    for chunk in keys.chunks(MAX_PAIRS_PER_QUERY) {
        let sql = format!(
            "SELECT name, scope, value FROM features WHERE (name, scope) IN (VALUES {})",
            vec!["(?, ?)"; chunk.len()].join(", ")
        );
        let params = chunk
            .iter()
            .flat_map(|key| [key.feature.as_str(), key.scope.as_str()]);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (name, scope, value) in rows {
            found.insert(FeatureKey::new(name, scope), parse_value(&value)?);
        }
    }

    Ok(found)
}

fn parse_value(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw)?)
}
