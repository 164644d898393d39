//! Load config from JSON and resolve it into a registry plus endpoint table.

use crate::config::resolved::{
    ColumnInfo, ColumnType, EntityDescriptor, ForeignKey, ResolvedEndpoint, ResolvedModel, SchemaModel,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::registry::Registry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Build the resolved model from full config. Validates first; relation blocks are
/// checked as each model is registered.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let identities: HashMap<String, String> = config
        .entities
        .iter()
        .map(|e| (e.name.clone(), e.identity.clone()))
        .collect();
    let mut registry = Registry::new(config.entities.iter().map(|e| resolve_entity(e, &identities)));
    for model in &config.models {
        registry.register(model)?;
    }
    registry.check_nested_models()?;

    let mut endpoint_by_path = HashMap::new();
    for ep in &config.endpoints {
        let lookup = |name: &Option<String>| -> Result<Option<Arc<SchemaModel>>, ConfigError> {
            name.as_deref()
                .map(|n| {
                    registry.model(n).cloned().ok_or_else(|| ConfigError::MissingReference {
                        kind: "model",
                        id: n.to_string(),
                    })
                })
                .transpose()
        };
        let endpoint = ResolvedEndpoint {
            path_segment: ep.path_segment.clone(),
            create: lookup(&ep.create)?,
            read: lookup(&ep.read)?,
            update: lookup(&ep.update)?,
            include_relations: ep.include_relations,
        };
        endpoint_by_path.insert(ep.path_segment.clone(), endpoint);
    }

    tracing::info!(
        entities = config.entities.len(),
        models = config.models.len(),
        endpoints = endpoint_by_path.len(),
        "resolved model config"
    );
    Ok(ResolvedModel {
        registry: Arc::new(registry),
        endpoint_by_path,
    })
}

/// Flatten one entity declaration. `identities` maps entity name to identity column so
/// foreign keys can point at it.
pub fn resolve_entity(entity: &EntityConfig, identities: &HashMap<String, String>) -> EntityDescriptor {
    let columns = entity
        .columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name.clone(),
            data_type: ColumnType::parse(c.type_.as_deref()),
            nullable: c.nullable,
            unique: c.unique,
            has_default: c.has_default,
            references: c.references.as_ref().map(|target| ForeignKey {
                entity: target.clone(),
                column: identities.get(target).cloned().unwrap_or_else(|| "id".into()),
            }),
        })
        .collect();
    EntityDescriptor {
        name: entity.name.clone(),
        schema_name: entity.schema.clone(),
        table_name: entity.table.clone().unwrap_or_else(|| entity.name.clone()),
        identity: entity.identity.clone(),
        columns,
        hidden: entity.hidden_columns.iter().cloned().collect(),
    }
}

pub fn load_from_str(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Load a config document from a JSON file, or from a directory holding
/// `entities.json`, `models.json` and (optionally) `endpoints.json`.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    if !meta.is_dir() {
        let text = read(path).await?;
        return load_from_str(&text);
    }

    let entities = parse(&read(&path.join("entities.json")).await?)?;
    let models = parse(&read(&path.join("models.json")).await?)?;
    let endpoints_path = path.join("endpoints.json");
    let endpoints = match tokio::fs::read_to_string(&endpoints_path).await {
        Ok(text) => parse(&text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", endpoints_path.display(), e))),
    };
    Ok(FullConfig {
        entities,
        models,
        endpoints,
    })
}

async fn read(path: &Path) -> Result<String, ConfigError> {
    tracing::debug!(path = %path.display(), "reading config");
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

fn parse<T>(text: &str) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    serde_json::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))
}
