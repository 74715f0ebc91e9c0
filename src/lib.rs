//! Feature flag resolution engine.
//!
//! Features are resolved once per (feature, scope) pair through a registered
//! resolver, stored by a pluggable [`Driver`], and read back from storage on
//! every later check until they are changed or forgotten.
//!
//! ```no_run
//! use flagpole::{FeatureManager, FlagpoleConfig, Scope};
//! use serde_json::json;
//!
//! # fn main() -> flagpole::Result<()> {
//! let features = FeatureManager::new(FlagpoleConfig::in_memory())?;
//! features.define("new-api", |scope| Ok(json!(scope.kind() == "user")));
//!
//! let user = features.for_scope(Scope::entity("user", 42))?;
//! assert!(user.active("new-api")?);
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod interaction;
pub mod manager;
pub mod resolver;
pub mod scope;

pub use access::{AccessControl, Gate};
pub use config::{FlagpoleConfig, StoreConfig};
pub use drivers::{DatabaseDriver, Driver, FeatureKey, MemoryDriver};
pub use engine::{FeatureBatch, ResolutionEngine, UnknownFeaturePolicy};
pub use error::{FeatureError, Result};
pub use interaction::{FeatureNames, PendingScopedFeatureInteraction};
pub use manager::FeatureManager;
pub use resolver::{FeatureDefinition, Resolver, ResolverRegistry};
pub use scope::{FeatureScope, Scope};
