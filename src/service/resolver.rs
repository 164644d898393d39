//! Relation resolution for writes: split an instance into columns and relation fields, then
//! create-then-link or link-existing per relation descriptor.
//!
//! Recursion follows the nesting of the input only, so it ends after as many hops as the
//! request is deep.

use crate::config::{RelationDescriptor, RelationKind};
use crate::error::{AppError, ConfigError};
use crate::model::{scalar_row, FieldValue, NestedInput, RelationInput, SchemaInstance};
use crate::registry::Registry;
use crate::service::BoxFuture;
use crate::storage::{Filter, Row, Session};
use serde_json::Value;
use std::sync::Arc;

/// Populated fields of one instance, split by declared metadata.
struct Partition<'i> {
    columns: Row,
    one_to_many: Vec<(Arc<RelationDescriptor>, &'i NestedInput)>,
    many_to_many: Vec<(Arc<RelationDescriptor>, &'i [NestedInput])>,
}

impl<'i> Partition<'i> {
    fn split(registry: &Registry, instance: &'i SchemaInstance) -> Result<Self, AppError> {
        let model = instance.model();
        let entity = model.entity();
        let mut parts = Partition {
            columns: scalar_row(instance),
            one_to_many: Vec::new(),
            many_to_many: Vec::new(),
        };
        if let Some(column) = parts.columns.keys().find(|c| !entity.has_column(c)) {
            return Err(ConfigError::UnknownColumn {
                entity: entity.name.clone(),
                column: column.clone(),
            }
            .into());
        }
        for (field, value) in instance.fields() {
            let FieldValue::Relation(input) = value else { continue };
            let relation = registry.lookup(&model.name, field).cloned().ok_or_else(|| {
                ConfigError::UnknownRelation {
                    model: model.name.clone(),
                    field: field.to_string(),
                }
            })?;
            match (&relation.kind, input) {
                (RelationKind::OneToMany { .. }, RelationInput::One(nested)) => {
                    parts.one_to_many.push((relation, nested));
                }
                (RelationKind::OneToMany { .. }, RelationInput::Many(_)) => {
                    return Err(AppError::BadRequest(format!("{} takes a single value", field)));
                }
                (RelationKind::ManyToMany { .. }, RelationInput::Many(items)) => {
                    parts.many_to_many.push((relation, items.as_slice()));
                }
                (RelationKind::ManyToMany { .. }, RelationInput::One(nested)) => {
                    parts.many_to_many.push((relation, std::slice::from_ref(nested)));
                }
            }
        }
        Ok(parts)
    }
}

/// Relation targets resolved to identities, ready to be written.
struct Links {
    foreign_keys: Row,
    associations: Vec<(Arc<RelationDescriptor>, Vec<Value>)>,
}

pub(crate) struct Resolver<'r> {
    registry: &'r Registry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Resolver { registry }
    }

    /// Insert a row for `instance` after resolving its relations; returns the new identity.
    pub fn create<'a>(
        &'a self,
        session: &'a mut dyn Session,
        instance: &'a SchemaInstance,
    ) -> BoxFuture<'a, Result<Value, AppError>> {
        Box::pin(async move {
            let entity = instance.model().entity();
            let parts = Partition::split(self.registry, instance)?;
            let links = self.resolve_links(session, &parts).await?;

            let mut row = parts.columns;
            row.extend(links.foreign_keys);
            let identity = session.insert(entity, &row).await?;
            tracing::debug!(entity = %entity.name, id = %identity, "created");

            self.write_associations(session, &identity, &links.associations).await?;
            Ok(identity)
        })
    }

    /// Apply `instance` to each row in `targets` (identities). Relation targets resolve once
    /// and link to every row; association links are only ever added. Returns the identities
    /// as they stand after the update.
    pub async fn update(
        &self,
        session: &mut dyn Session,
        instance: &SchemaInstance,
        targets: &[Value],
    ) -> Result<Vec<Value>, AppError> {
        let entity = instance.model().entity();
        let parts = Partition::split(self.registry, instance)?;
        let links = self.resolve_links(session, &parts).await?;

        let mut values = parts.columns;
        values.extend(links.foreign_keys);
        let mut out = Vec::with_capacity(targets.len());
        for id in targets {
            if !values.is_empty() {
                session
                    .update(entity, &Filter::by_identity(entity, id.clone()), &values)
                    .await?;
            }
            let current = values
                .get(&entity.identity)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| id.clone());
            self.write_associations(session, &current, &links.associations).await?;
            out.push(current);
        }
        Ok(out)
    }

    async fn resolve_links(&self, session: &mut dyn Session, parts: &Partition<'_>) -> Result<Links, AppError> {
        let mut links = Links {
            foreign_keys: Row::new(),
            associations: Vec::new(),
        };
        for (relation, input) in &parts.one_to_many {
            let RelationKind::OneToMany { linked_field } = &relation.kind else { continue };
            let id = self.resolve_target(session, relation, input).await?;
            links.foreign_keys.insert(linked_field.clone(), id);
        }
        for (relation, inputs) in &parts.many_to_many {
            let mut ids = Vec::with_capacity(inputs.len());
            for input in inputs.iter() {
                ids.push(self.resolve_target(session, relation, input).await?);
            }
            links.associations.push((relation.clone(), ids));
        }
        Ok(links)
    }

    /// Identity of the related row: created from a nested value, or checked to exist.
    async fn resolve_target(
        &self,
        session: &mut dyn Session,
        relation: &RelationDescriptor,
        input: &NestedInput,
    ) -> Result<Value, AppError> {
        let target = &relation.target;
        match input {
            NestedInput::ByReference(id) => {
                let found = session.query(target, &Filter::by_identity(target, id.clone())).await?;
                if found.is_empty() {
                    return Err(AppError::NotFound(format!(
                        "{} with {} = {} (via {}.{})",
                        target.name, target.identity, id, relation.owner, relation.field_name
                    )));
                }
                Ok(id.clone())
            }
            NestedInput::ByValue(nested) => {
                let nested_entity = &nested.model().entity().name;
                if *nested_entity != target.name {
                    return Err(ConfigError::InvalidRelation(format!(
                        "{}.{} expects {}, got a {} value",
                        relation.owner, relation.field_name, target.name, nested_entity
                    ))
                    .into());
                }
                self.create(session, nested).await
            }
        }
    }

    async fn write_associations(
        &self,
        session: &mut dyn Session,
        parent: &Value,
        associations: &[(Arc<RelationDescriptor>, Vec<Value>)],
    ) -> Result<(), AppError> {
        for (relation, ids) in associations {
            let RelationKind::ManyToMany { join, local_link, target_link } = &relation.kind else {
                continue;
            };
            for id in ids {
                let mut row = Row::new();
                row.insert(local_link.clone(), parent.clone());
                row.insert(target_link.clone(), id.clone());
                session.insert(join, &row).await?;
            }
            tracing::debug!(relation = %relation.field_name, links = ids.len(), "linked");
        }
        Ok(())
    }
}
