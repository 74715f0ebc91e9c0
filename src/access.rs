//! Feature-aware authorization.
//!
//! Combines "is the feature active for this scope" with an application
//! [`Gate`]. Only features registered as [`FeatureDefinition`]s take part
//! in the authorization check; closure resolvers only need to be active.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::interaction::{FeatureNames, PendingScopedFeatureInteraction};
use crate::resolver::FeatureDefinition;
use crate::scope::Scope;

/// Application authorization gate.
pub trait Gate: Send + Sync {
    /// Whether `scope` may perform `ability` on `feature`.
    fn allows(&self, ability: &str, feature: &str, scope: &Scope, params: &Value) -> bool;
}

/// Authorization bridge configured with a scope-kind to handler table.
#[derive(Clone)]
pub struct AccessControl {
    gate: Arc<dyn Gate>,
    subscriptions: HashMap<String, String>,
}

impl AccessControl {
    pub fn new(gate: Arc<dyn Gate>, subscriptions: HashMap<String, String>) -> Self {
        Self {
            gate,
            subscriptions,
        }
    }

    /// Handler name registered for a scope kind.
    pub fn handler_for(&self, scope: &Scope) -> Option<&str> {
        self.subscriptions.get(scope.kind()).map(String::as_str)
    }

    /// True when the features are active for every scope of the
    /// interaction and every definition-based feature is authorized.
    pub fn can(
        &self,
        interaction: &PendingScopedFeatureInteraction,
        features: impl FeatureNames,
        params: &Value,
    ) -> Result<bool> {
        let features = features.into_names();
        if !interaction.all_are_active(features.clone())? {
            return Ok(false);
        }

        let registry = interaction.engine().registry();
        let scopes = interaction.scopes();

        for feature in &features {
            let Some(definition) = registry.get(feature).and_then(|r| r.definition().cloned())
            else {
                continue;
            };
            for scope in &scopes {
                if !self.authorize(definition.as_ref(), scope, params) {
                    tracing::debug!(feature = %feature, scope = %scope, "Feature access denied");
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// True when any single feature passes [`Self::can`].
    pub fn can_any(
        &self,
        interaction: &PendingScopedFeatureInteraction,
        features: impl FeatureNames,
        params: &Value,
    ) -> Result<bool> {
        for feature in features.into_names() {
            if self.can(interaction, feature, params)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn cant(
        &self,
        interaction: &PendingScopedFeatureInteraction,
        features: impl FeatureNames,
        params: &Value,
    ) -> Result<bool> {
        Ok(!self.can(interaction, features, params)?)
    }

    pub fn cannot(
        &self,
        interaction: &PendingScopedFeatureInteraction,
        features: impl FeatureNames,
        params: &Value,
    ) -> Result<bool> {
        self.cant(interaction, features, params)
    }

    fn authorize(&self, definition: &dyn FeatureDefinition, scope: &Scope, params: &Value) -> bool {
        if let Some(decision) = definition.authorize(scope, params) {
            return decision;
        }
        let ability = self.handler_for(scope).unwrap_or(definition.name());
        self.gate.allows(ability, definition.name(), scope, params)
    }
}
