//! Relation descriptor registry: schema models keyed by name, each with the relation
//! descriptors it exposes. Built once at startup, read-only afterwards.

use crate::config::{
    EntityDescriptor, FieldSpec, ManyToManyConfig, OneToManyConfig, RelationDescriptor, RelationKind,
    SchemaModel, SchemaModelConfig,
};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Registry {
    entities: HashMap<String, Arc<EntityDescriptor>>,
    models: HashMap<String, Arc<SchemaModel>>,
    /// Union of the relations every model declares on an entity; drives nested output.
    entity_relations: HashMap<String, Vec<Arc<RelationDescriptor>>>,
}

impl Registry {
    pub fn new(entities: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        let entities = entities
            .into_iter()
            .map(|e| (e.name.clone(), Arc::new(e)))
            .collect();
        Registry {
            entities,
            ..Default::default()
        }
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(name)
    }

    pub fn model(&self, name: &str) -> Option<&Arc<SchemaModel>> {
        self.models.get(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<SchemaModel>> {
        self.models.values()
    }

    pub fn lookup(&self, model: &str, field: &str) -> Option<&Arc<RelationDescriptor>> {
        self.models.get(model)?.relation(field)
    }

    pub fn entity_relations(&self, entity: &str) -> &[Arc<RelationDescriptor>] {
        self.entity_relations
            .get(entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Model used to parse nested values of `field`: the declared nested model, or a
    /// permissive model over the relation target.
    pub fn nested_model(&self, model: &SchemaModel, field: &str) -> Option<Arc<SchemaModel>> {
        let relation = model.relation(field)?;
        let named = model
            .field(field)
            .and_then(|f| f.nested_model.as_deref())
            .and_then(|name| self.models.get(name));
        Some(match named {
            Some(m) => m.clone(),
            None => Arc::new(SchemaModel::permissive(relation.target.clone())),
        })
    }

    /// Validate and store one schema model with its relation block. Nothing is stored on error.
    pub fn register(&mut self, config: &SchemaModelConfig) -> Result<Arc<SchemaModel>, ConfigError> {
        if self.models.contains_key(&config.name) {
            return Err(ConfigError::Duplicate {
                kind: "model",
                name: config.name.clone(),
            });
        }
        let entity = self
            .entities
            .get(&config.entity)
            .cloned()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: config.entity.clone(),
            })?;

        let mut seen = HashSet::new();
        let mut relations = Vec::new();
        for (field, rel) in &config.relations.one_to_many {
            self.check_relation_field(config, &entity, field, &mut seen)?;
            relations.push(self.one_to_many(&entity, field, rel)?);
        }
        for (field, rel) in &config.relations.many_to_many {
            self.check_relation_field(config, &entity, field, &mut seen)?;
            relations.push(self.many_to_many(&entity, field, rel)?);
        }

        // Reuse descriptors already known for this entity so the union stays consistent.
        let known = self.entity_relations(&entity.name);
        let mut additions = Vec::new();
        let relations: Vec<Arc<RelationDescriptor>> = relations
            .into_iter()
            .map(|rel| match known.iter().find(|k| k.field_name == rel.field_name) {
                Some(existing) if existing.same_shape(&rel) => Ok(existing.clone()),
                Some(_) => Err(ConfigError::InvalidRelation(format!(
                    "{}.{} is declared with conflicting shapes",
                    entity.name, rel.field_name
                ))),
                None => {
                    let rel = Arc::new(rel);
                    additions.push(rel.clone());
                    Ok(rel)
                }
            })
            .collect::<Result<_, _>>()?;

        let fields = build_fields(config, &entity, &relations)?;
        let model = Arc::new(SchemaModel {
            name: config.name.clone(),
            entity: entity.clone(),
            fields,
            relations,
        });

        self.entity_relations
            .entry(entity.name.clone())
            .or_default()
            .extend(additions);
        self.models.insert(config.name.clone(), model.clone());
        tracing::debug!(model = %config.name, entity = %entity.name, "registered schema model");
        Ok(model)
    }

    /// Nested models named by relation fields must exist and target the relation's entity.
    pub fn check_nested_models(&self) -> Result<(), ConfigError> {
        for model in self.models.values() {
            for field in &model.fields {
                let Some(nested) = &field.nested_model else { continue };
                let nested_model = self.models.get(nested).ok_or_else(|| ConfigError::MissingReference {
                    kind: "model",
                    id: nested.clone(),
                })?;
                let Some(relation) = model.relation(&field.name) else { continue };
                if nested_model.entity.name != relation.target.name {
                    return Err(ConfigError::InvalidRelation(format!(
                        "{}.{}: model {} targets {}, expected {}",
                        model.name, field.name, nested, nested_model.entity.name, relation.target.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_relation_field(
        &self,
        config: &SchemaModelConfig,
        entity: &EntityDescriptor,
        field: &str,
        seen: &mut HashSet<String>,
    ) -> Result<(), ConfigError> {
        if !seen.insert(field.to_string()) {
            return Err(ConfigError::DuplicateRelation {
                model: config.name.clone(),
                field: field.to_string(),
            });
        }
        if entity.has_column(field) {
            return Err(ConfigError::InvalidRelation(format!(
                "{}.{} is both a column and a relation",
                entity.name, field
            )));
        }
        Ok(())
    }

    fn target(&self, name: &str) -> Result<Arc<EntityDescriptor>, ConfigError> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: name.to_string(),
            })
    }

    fn one_to_many(
        &self,
        owner: &EntityDescriptor,
        field: &str,
        rel: &OneToManyConfig,
    ) -> Result<RelationDescriptor, ConfigError> {
        let target = self.target(&rel.model)?;
        if !owner.has_column(&rel.linked_field) {
            return Err(ConfigError::UnknownColumn {
                entity: owner.name.clone(),
                column: rel.linked_field.clone(),
            });
        }
        Ok(RelationDescriptor {
            field_name: field.to_string(),
            owner: owner.name.clone(),
            target,
            kind: RelationKind::OneToMany {
                linked_field: rel.linked_field.clone(),
            },
        })
    }

    fn many_to_many(
        &self,
        owner: &EntityDescriptor,
        field: &str,
        rel: &ManyToManyConfig,
    ) -> Result<RelationDescriptor, ConfigError> {
        let target = self.target(&rel.model)?;
        let join = self.target(&rel.second_model)?;
        let [local_link, target_link] = rel.linked_fields.as_slice() else {
            return Err(ConfigError::InvalidRelation(format!(
                "{}.{}: linked_fields must name exactly two columns",
                owner.name, field
            )));
        };
        if local_link == target_link {
            return Err(ConfigError::InvalidRelation(format!(
                "{}.{}: linked_fields must be distinct",
                owner.name, field
            )));
        }
        for column in [local_link, target_link] {
            if !join.has_column(column) {
                return Err(ConfigError::UnknownColumn {
                    entity: join.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(RelationDescriptor {
            field_name: field.to_string(),
            owner: owner.name.clone(),
            target,
            kind: RelationKind::ManyToMany {
                join,
                local_link: local_link.clone(),
                target_link: target_link.clone(),
            },
        })
    }
}

fn build_fields(
    config: &SchemaModelConfig,
    entity: &EntityDescriptor,
    relations: &[Arc<RelationDescriptor>],
) -> Result<Vec<FieldSpec>, ConfigError> {
    let mut fields: Vec<FieldSpec> = if config.fields.is_empty() {
        SchemaModel::permissive(Arc::new(entity.clone())).fields
    } else {
        let mut out = Vec::with_capacity(config.fields.len());
        for (name, field) in &config.fields {
            let is_relation = relations.iter().any(|r| r.field_name == *name);
            if !is_relation && !entity.has_column(name) {
                return Err(ConfigError::UnknownColumn {
                    entity: entity.name.clone(),
                    column: name.clone(),
                });
            }
            if !is_relation && field.model.is_some() {
                return Err(ConfigError::Validation(format!(
                    "{}.{}: only relation fields take a nested model",
                    config.name, name
                )));
            }
            let spec = FieldSpec::with_rule(name.clone(), field.rule.clone(), field.model.clone()).map_err(|e| {
                ConfigError::Validation(format!("{}.{}: invalid pattern: {}", config.name, name, e))
            })?;
            out.push(spec);
        }
        out
    };
    for rel in relations {
        if !fields.iter().any(|f| f.name == rel.field_name) {
            fields.push(FieldSpec::plain(rel.field_name.clone()));
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_entity, EntityConfig};

    fn entity(json: serde_json::Value) -> EntityDescriptor {
        let cfg: EntityConfig = serde_json::from_value(json).expect("entity json");
        resolve_entity(&cfg, &HashMap::new())
    }

    fn registry() -> Registry {
        Registry::new([
            entity(serde_json::json!({
                "name": "students", "identity": "id",
                "columns": [{ "name": "id" }, { "name": "name" }, { "name": "dorm_id" }]
            })),
            entity(serde_json::json!({
                "name": "dorms", "identity": "id",
                "columns": [{ "name": "id" }, { "name": "name" }]
            })),
            entity(serde_json::json!({
                "name": "courses", "identity": "id",
                "columns": [{ "name": "id" }, { "name": "name" }]
            })),
            entity(serde_json::json!({
                "name": "students_courses", "identity": "id",
                "columns": [{ "name": "id" }, { "name": "students_id" }, { "name": "courses_id" }]
            })),
        ])
    }

    fn model(json: serde_json::Value) -> SchemaModelConfig {
        serde_json::from_value(json).expect("model json")
    }

    #[test]
    fn registers_both_relation_kinds() {
        let mut reg = registry();
        reg.register(&model(serde_json::json!({
            "name": "StudentCreate",
            "entity": "students",
            "relations": {
                "one_to_many": { "dorm": { "model": "dorms", "linked_field": "dorm_id" } },
                "many_to_many": { "courses": {
                    "model": "courses",
                    "second_model": "students_courses",
                    "linked_fields": ["students_id", "courses_id"]
                } }
            }
        })))
        .unwrap();

        let dorm = reg.lookup("StudentCreate", "dorm").unwrap();
        assert!(matches!(&dorm.kind, RelationKind::OneToMany { linked_field } if linked_field == "dorm_id"));
        let courses = reg.lookup("StudentCreate", "courses").unwrap();
        assert!(matches!(&courses.kind, RelationKind::ManyToMany { join, .. } if join.name == "students_courses"));
        assert!(reg.lookup("StudentCreate", "name").is_none());
        assert_eq!(reg.entity_relations("students").len(), 2);
    }

    #[test]
    fn rejects_unknown_linked_field() {
        let mut reg = registry();
        let err = reg
            .register(&model(serde_json::json!({
                "name": "StudentCreate",
                "entity": "students",
                "relations": { "one_to_many": { "dorm": { "model": "dorms", "linked_field": "dormitory" } } }
            })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownColumn { column, .. } if column == "dormitory"));
        assert!(reg.model("StudentCreate").is_none());
    }

    #[test]
    fn rejects_unknown_join_column() {
        let mut reg = registry();
        let err = reg
            .register(&model(serde_json::json!({
                "name": "StudentCreate",
                "entity": "students",
                "relations": { "many_to_many": { "courses": {
                    "model": "courses",
                    "second_model": "students_courses",
                    "linked_fields": ["students_id", "course"]
                } } }
            })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownColumn { entity, .. } if entity == "students_courses"));
    }

    #[test]
    fn rejects_missing_target_entity() {
        let mut reg = registry();
        let err = reg
            .register(&model(serde_json::json!({
                "name": "StudentCreate",
                "entity": "students",
                "relations": { "one_to_many": { "dorm": { "model": "halls", "linked_field": "dorm_id" } } }
            })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingReference { kind: "entity", .. }));
    }

    #[test]
    fn rejects_field_shared_across_kinds() {
        let mut reg = registry();
        let err = reg
            .register(&model(serde_json::json!({
                "name": "StudentCreate",
                "entity": "students",
                "relations": {
                    "one_to_many": { "dorm": { "model": "dorms", "linked_field": "dorm_id" } },
                    "many_to_many": { "dorm": {
                        "model": "courses",
                        "second_model": "students_courses",
                        "linked_fields": ["students_id", "courses_id"]
                    } }
                }
            })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRelation { .. }));
    }

    #[test]
    fn unknown_relation_kind_is_a_config_error() {
        let parsed: Result<SchemaModelConfig, _> = serde_json::from_value(serde_json::json!({
            "name": "StudentCreate",
            "entity": "students",
            "relations": { "one_to_one": { "dorm": { "model": "dorms", "linked_field": "dorm_id" } } }
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_conflicting_shapes_across_models() {
        let mut reg = registry();
        reg.register(&model(serde_json::json!({
            "name": "StudentCreate",
            "entity": "students",
            "relations": { "one_to_many": { "dorm": { "model": "dorms", "linked_field": "dorm_id" } } }
        })))
        .unwrap();
        let err = reg
            .register(&model(serde_json::json!({
                "name": "StudentGet",
                "entity": "students",
                "relations": { "one_to_many": { "dorm": { "model": "courses", "linked_field": "dorm_id" } } }
            })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRelation(_)));
        assert_eq!(reg.entity_relations("students").len(), 1);
    }

    #[test]
    fn nested_model_must_target_relation_entity() {
        let mut reg = registry();
        reg.register(&model(serde_json::json!({ "name": "CoursesCreate", "entity": "courses" })))
            .unwrap();
        reg.register(&model(serde_json::json!({
            "name": "StudentCreate",
            "entity": "students",
            "fields": { "name": { "required": true }, "dorm": { "model": "CoursesCreate" } },
            "relations": { "one_to_many": { "dorm": { "model": "dorms", "linked_field": "dorm_id" } } }
        })))
        .unwrap();
        assert!(matches!(reg.check_nested_models(), Err(ConfigError::InvalidRelation(_))));
    }

    #[test]
    fn invalid_pattern_fails_registration() {
        let mut reg = registry();
        let err = reg
            .register(&model(serde_json::json!({
                "name": "DormsCreate",
                "entity": "dorms",
                "fields": { "name": { "pattern": "([a-z" } }
            })))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("invalid pattern")), "{err:?}");
        assert!(reg.model("DormsCreate").is_none());
    }
}
