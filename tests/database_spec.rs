use std::sync::Arc;

use flagpole::{DatabaseDriver, Driver, FeatureKey, ResolutionEngine, ResolverRegistry, Scope};
use serde_json::json;
use speculate2::speculate;

speculate! {
    before {
        let db = DatabaseDriver::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "get and set" {
        it "returns None for a pair that was never stored" {
            let value = db.get("beta", "user|1").expect("Query failed");
            assert!(value.is_none());
        }

        it "stores JSON values" {
            db.set("beta", "user|1", &json!({"variant": "b", "weight": 3})).expect("Failed to set");

            let value = db.get("beta", "user|1").expect("Query failed");
            assert_eq!(value, Some(json!({"variant": "b", "weight": 3})));
        }

        it "overwrites an existing value" {
            db.set("beta", "user|1", &json!(true)).expect("Failed to set");
            db.set("beta", "user|1", &json!(false)).expect("Failed to set");

            assert_eq!(db.get("beta", "user|1").unwrap(), Some(json!(false)));
        }
    }

    describe "delete" {
        it "removes the stored value" {
            db.set("beta", "user|1", &json!(true)).unwrap();
            db.delete("beta", "user|1").expect("Failed to delete");

            assert!(db.get("beta", "user|1").unwrap().is_none());
        }

        it "does not fail for absent values" {
            db.delete("beta", "user|404").expect("Delete of absent value failed");
        }
    }

    describe "get_all" {
        it "returns only stored pairs" {
            db.set("a", "user|1", &json!(true)).unwrap();
            db.set("b", "user|2", &json!("blue")).unwrap();
            db.set("a", "user|2", &json!(false)).unwrap();

            let found = db.get_all(&[
                FeatureKey::new("a", "user|1"),
                FeatureKey::new("b", "user|2"),
                FeatureKey::new("b", "user|1"),
            ]).expect("Query failed");

            assert_eq!(found.len(), 2);
            assert_eq!(found[&FeatureKey::new("a", "user|1")], json!(true));
            assert_eq!(found[&FeatureKey::new("b", "user|2")], json!("blue"));
        }

        it "handles batches larger than one statement" {
            let keys: Vec<FeatureKey> = (0..20_000)
                .map(|i| FeatureKey::new("bulk", format!("user|{}", i)))
                .collect();
            db.set("bulk", "user|19999", &json!(true)).unwrap();
            db.set("bulk", "user|0", &json!(true)).unwrap();

            let found = db.get_all(&keys).expect("Query failed");
            assert_eq!(found.len(), 2);
        }
    }

    describe "insert_missing" {
        it "keeps the first stored value" {
            db.set("beta", "user|1", &json!("first")).unwrap();

            let stored = db.insert_missing(&[
                (FeatureKey::new("beta", "user|1"), json!("second")),
                (FeatureKey::new("beta", "user|2"), json!("second")),
            ]).expect("Insert failed");

            assert_eq!(stored[&FeatureKey::new("beta", "user|1")], json!("first"));
            assert_eq!(stored[&FeatureKey::new("beta", "user|2")], json!("second"));
            assert_eq!(db.get("beta", "user|1").unwrap(), Some(json!("first")));
        }
    }

    describe "set_for_all_scopes" {
        it "updates only the named feature" {
            db.set("a", "user|1", &json!(true)).unwrap();
            db.set("a", "user|2", &json!(true)).unwrap();
            db.set("b", "user|1", &json!(true)).unwrap();

            db.set_for_all_scopes("a", &json!(false)).unwrap();

            assert_eq!(db.get("a", "user|1").unwrap(), Some(json!(false)));
            assert_eq!(db.get("a", "user|2").unwrap(), Some(json!(false)));
            assert_eq!(db.get("b", "user|1").unwrap(), Some(json!(true)));
        }
    }

    describe "purge and defined" {
        it "lists stored feature names once, sorted" {
            db.set("zeta", "user|1", &json!(true)).unwrap();
            db.set("alpha", "user|1", &json!(true)).unwrap();
            db.set("alpha", "user|2", &json!(true)).unwrap();

            assert_eq!(db.defined().unwrap(), vec!["alpha".to_string(), "zeta".to_string()]);
        }

        it "purges named features" {
            db.set("zeta", "user|1", &json!(true)).unwrap();
            db.set("alpha", "user|1", &json!(true)).unwrap();

            db.purge(Some(&["zeta".to_string()][..])).unwrap();

            assert_eq!(db.defined().unwrap(), vec!["alpha".to_string()]);
        }

        it "purges everything" {
            db.set("zeta", "user|1", &json!(true)).unwrap();
            db.set("alpha", "user|1", &json!(true)).unwrap();

            db.purge(None).unwrap();

            assert!(db.defined().unwrap().is_empty());
        }

        it "ignores an empty purge list" {
            db.set("alpha", "user|1", &json!(true)).unwrap();

            db.purge(Some(&[] as &[String])).unwrap();

            assert_eq!(db.defined().unwrap(), vec!["alpha".to_string()]);
        }
    }

    describe "engine on disk" {
        it "keeps resolved values across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("flags").join("flagpole.db");

            let registry = Arc::new(ResolverRegistry::new());
            registry.define_value("new-api", json!("v2"));

            let driver = DatabaseDriver::open(path.clone()).expect("Failed to open database");
            driver.migrate().expect("Failed to migrate");
            let engine = ResolutionEngine::new("database", Arc::new(driver), registry);
            assert_eq!(engine.get("new-api", &Scope::entity("user", 7)).unwrap(), json!("v2"));

            let reopened = DatabaseDriver::open(path).expect("Failed to reopen database");
            reopened.migrate().expect("Failed to migrate");
            assert_eq!(reopened.get("new-api", "user|7").unwrap(), Some(json!("v2")));
        }
    }
}
