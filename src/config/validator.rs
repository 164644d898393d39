//! Config validation: referential integrity of entities, models and endpoints.
//! Relation blocks are checked when a model is registered (see `Registry::register`).

use crate::config::FullConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut entity_names = HashSet::new();
    for e in &config.entities {
        if !entity_names.insert(e.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "entity",
                name: e.name.clone(),
            });
        }
    }

    for e in &config.entities {
        let mut columns = HashSet::new();
        for c in &e.columns {
            if !columns.insert(c.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "column",
                    name: format!("{}.{}", e.name, c.name),
                });
            }
            if let Some(target) = &c.references {
                if !entity_names.contains(target.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "entity",
                        id: target.clone(),
                    });
                }
            }
        }
        if !columns.contains(e.identity.as_str()) {
            return Err(ConfigError::UnknownColumn {
                entity: e.name.clone(),
                column: e.identity.clone(),
            });
        }
        for hidden in &e.hidden_columns {
            if !columns.contains(hidden.as_str()) {
                return Err(ConfigError::UnknownColumn {
                    entity: e.name.clone(),
                    column: hidden.clone(),
                });
            }
        }
    }

    let mut model_names = HashSet::new();
    for m in &config.models {
        if !entity_names.contains(m.entity.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "entity",
                id: m.entity.clone(),
            });
        }
        if !model_names.insert(m.name.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "model",
                name: m.name.clone(),
            });
        }
    }

    let mut path_segments = HashSet::new();
    for ep in &config.endpoints {
        if !path_segments.insert(ep.path_segment.as_str()) {
            return Err(ConfigError::Duplicate {
                kind: "path segment",
                name: ep.path_segment.clone(),
            });
        }
        for model in [&ep.create, &ep.read, &ep.update].into_iter().flatten() {
            if !model_names.contains(model.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "model",
                    id: model.clone(),
                });
            }
        }
    }

    Ok(())
}
