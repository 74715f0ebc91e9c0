//! Scopes and their storage keys.
//!
//! A [`Scope`] is the "who" a feature decision applies to: nobody in
//! particular (the global scope), a plain text or numeric identifier, or a
//! typed entity such as a user or a team. Every scope normalizes to a
//! deterministic [`Scope::key`] that the storage drivers use as part of the
//! primary key, so the same entity always maps to the same stored value.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FeatureError, Result};

/// Storage key used for the global scope.
pub const GLOBAL_SCOPE_KEY: &str = "__flagpole_null";

/// Separates an entity kind from its identifier in a storage key.
pub const KIND_SEPARATOR: char = '|';

/// The entity a feature decision is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// No scope at all; one decision shared by everybody.
    Global,
    Text {
        value: String,
    },
    Number {
        value: i64,
    },
    /// A typed entity, e.g. `user` 42 or `team` "acme".
    Entity {
        #[serde(rename = "type")]
        kind: String,
        id: String,
    },
}

impl Scope {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn entity(kind: impl Into<String>, id: impl ToString) -> Self {
        Self::Entity {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// The kind tag used to look up authorization handlers.
    pub fn kind(&self) -> &str {
        match self {
            Self::Global => "global",
            Self::Text { .. } => "text",
            Self::Number { .. } => "number",
            Self::Entity { kind, .. } => kind,
        }
    }

    /// Normalize the scope into its storage key.
    ///
    /// Entity keys are namespaced as `kind|id`, so text scopes may not
    /// contain the separator and may not equal the global sentinel.
    pub fn key(&self) -> Result<String> {
        match self {
            Self::Global => Ok(GLOBAL_SCOPE_KEY.to_string()),
            Self::Number { value } => Ok(value.to_string()),
            Self::Text { value } => {
                if value.is_empty() {
                    return Err(FeatureError::UnresolvableScope(
                        "text scope is empty".to_string(),
                    ));
                }
                if value == GLOBAL_SCOPE_KEY || value.contains(KIND_SEPARATOR) {
                    return Err(FeatureError::UnresolvableScope(format!(
                        "text scope `{}` collides with a reserved key",
                        value
                    )));
                }
                Ok(value.clone())
            }
            Self::Entity { kind, id } => {
                if kind.is_empty() || kind.contains(KIND_SEPARATOR) {
                    return Err(FeatureError::UnresolvableScope(format!(
                        "invalid entity kind `{}`",
                        kind
                    )));
                }
                if id.is_empty() {
                    return Err(FeatureError::UnresolvableScope(format!(
                        "{} entity has no identifier",
                        kind
                    )));
                }
                Ok(format!("{}{}{}", kind, KIND_SEPARATOR, id))
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Text { value } => write!(f, "{}", value),
            Self::Number { value } => write!(f, "{}", value),
            Self::Entity { kind, id } => write!(f, "{}#{}", kind, id),
        }
    }
}

/// Conversion from application values into a [`Scope`].
///
/// Implement this for domain types (users, teams, ...) so they can be handed
/// straight to [`crate::PendingScopedFeatureInteraction::for_scope`].
pub trait FeatureScope {
    fn to_feature_scope(&self) -> Scope;
}

impl FeatureScope for Scope {
    fn to_feature_scope(&self) -> Scope {
        self.clone()
    }
}

impl FeatureScope for str {
    fn to_feature_scope(&self) -> Scope {
        Scope::text(self)
    }
}

impl FeatureScope for String {
    fn to_feature_scope(&self) -> Scope {
        Scope::text(self.as_str())
    }
}

impl FeatureScope for Uuid {
    fn to_feature_scope(&self) -> Scope {
        Scope::text(self.to_string())
    }
}

impl<T: FeatureScope> FeatureScope for Option<T> {
    fn to_feature_scope(&self) -> Scope {
        match self {
            Some(scope) => scope.to_feature_scope(),
            None => Scope::Global,
        }
    }
}

impl<T: FeatureScope + ?Sized> FeatureScope for &T {
    fn to_feature_scope(&self) -> Scope {
        (**self).to_feature_scope()
    }
}

macro_rules! number_scope {
    ($($ty:ty),*) => {
        $(
            impl FeatureScope for $ty {
                fn to_feature_scope(&self) -> Scope {
                    Scope::Number { value: i64::from(*self) }
                }
            }
        )*
    };
}

number_scope!(i8, i16, i32, i64, u8, u16, u32);
