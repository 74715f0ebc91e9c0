use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flagpole::{FeatureManager, FlagpoleConfig, PendingScopedFeatureInteraction, Scope};

#[derive(Parser)]
#[command(name = "flagpole")]
#[command(about = "Inspect and change stored feature flag values")]
struct Cli {
    /// Path to a config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store to operate on (defaults to the configured default store)
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    /// Scope as `global`, `kind:id` or a plain identifier. Repeatable.
    #[arg(short, long = "scope")]
    scopes: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored value of a feature
    Get {
        feature: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Store a value for features (defaults to `true`)
    Activate {
        #[arg(required = true)]
        features: Vec<String>,
        /// JSON value to store
        #[arg(long)]
        value: Option<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Store `false` for features
    Deactivate {
        #[arg(required = true)]
        features: Vec<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Delete stored values so features resolve again
    Forget {
        #[arg(required = true)]
        features: Vec<String>,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Delete every stored value of features (all features if none given)
    Purge { features: Vec<String> },
    /// List features with stored values
    List,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "flagpole=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_scope(raw: &str) -> Scope {
    if raw == "global" {
        return Scope::Global;
    }
    if let Some((kind, id)) = raw.split_once(':') {
        return Scope::entity(kind, id);
    }
    match raw.parse::<i64>() {
        Ok(value) => Scope::Number { value },
        Err(_) => Scope::text(raw),
    }
}

fn interaction(
    manager: &FeatureManager,
    store: &str,
    scope: &ScopeArgs,
) -> anyhow::Result<PendingScopedFeatureInteraction> {
    Ok(manager
        .interaction_on(store)?
        .for_scopes(scope.scopes.iter().map(|s| parse_scope(s))))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match &cli.config {
        Some(path) => FlagpoleConfig::load_from(path)?,
        None => FlagpoleConfig::load(),
    };
    let store = cli
        .store
        .clone()
        .unwrap_or_else(|| config.default_store.clone());
    let manager = FeatureManager::new(config)?;

    match cli.command {
        Commands::Get { feature, scope } => {
            let interaction = interaction(&manager, &store, &scope)?;
            for scope in interaction.scopes() {
                match interaction.engine().stored_value(&feature, &scope)? {
                    Some(value) => println!("{} [{}]: {}", feature, scope, value),
                    None => println!("{} [{}]: not stored", feature, scope),
                }
            }
        }
        Commands::Activate {
            features,
            value,
            scope,
        } => {
            let value = match value {
                Some(raw) => serde_json::from_str(&raw)?,
                None => serde_json::Value::Bool(true),
            };
            interaction(&manager, &store, &scope)?.activate_with(features.clone(), value)?;
            tracing::info!("Activated {}", features.join(", "));
        }
        Commands::Deactivate { features, scope } => {
            interaction(&manager, &store, &scope)?.deactivate(features.clone())?;
            tracing::info!("Deactivated {}", features.join(", "));
        }
        Commands::Forget { features, scope } => {
            interaction(&manager, &store, &scope)?.forget(features.clone())?;
            tracing::info!("Forgot {}", features.join(", "));
        }
        Commands::Purge { features } => {
            let engine = manager.store(&store)?;
            if features.is_empty() {
                engine.purge(None)?;
                tracing::info!("Purged all features");
            } else {
                engine.purge(Some(features.as_slice()))?;
                tracing::info!("Purged {}", features.join(", "));
            }
        }
        Commands::List => {
            for feature in manager.store(&store)?.stored()? {
                println!("{}", feature);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope_forms() {
        assert_eq!(parse_scope("global"), Scope::Global);
        assert_eq!(parse_scope("user:42"), Scope::entity("user", 42));
        assert_eq!(parse_scope("7"), Scope::Number { value: 7 });
        assert_eq!(parse_scope("acme"), Scope::text("acme"));
    }
}
