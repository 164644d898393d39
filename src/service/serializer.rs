//! Output serializer: stored row plus requested relations -> plain JSON tree.
//!
//! Back-references are cut with a path set of `(entity, identity)` pairs owned by one
//! top-level `serialize` call: a related row already on the current path is skipped.

use crate::config::{EntityDescriptor, RelationDescriptor, RelationKind, SchemaModel};
use crate::error::{AppError, ConfigError};
use crate::registry::Registry;
use crate::service::BoxFuture;
use crate::storage::{Filter, Row, Session};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Which relations to embed at the top level. Nested entities embed all of theirs.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Include {
    #[default]
    None,
    All,
    Fields(Vec<String>),
}

impl Include {
    /// The relations `model` declares when `include_relations` is set, else none.
    pub fn for_model(model: &SchemaModel, include_relations: bool) -> Self {
        if include_relations {
            Include::Fields(model.relation_fields())
        } else {
            Include::None
        }
    }
}

type PathKey = (String, String);

fn path_key(entity: &EntityDescriptor, id: &Value) -> PathKey {
    (entity.name.clone(), id.to_string())
}

pub struct Serializer<'r> {
    registry: &'r Registry,
}

impl<'r> Serializer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Serializer { registry }
    }

    pub async fn serialize(
        &self,
        session: &mut dyn Session,
        entity: &EntityDescriptor,
        row: &Row,
        include: &Include,
    ) -> Result<Value, AppError> {
        let mut path = HashSet::new();
        self.walk(session, entity, row, include, &mut path).await
    }

    fn relations(&self, entity: &EntityDescriptor, include: &Include) -> Result<Vec<Arc<RelationDescriptor>>, AppError> {
        let declared = self.registry.entity_relations(&entity.name);
        match include {
            Include::None => Ok(Vec::new()),
            Include::All => Ok(declared.to_vec()),
            Include::Fields(names) => names
                .iter()
                .map(|name| {
                    declared
                        .iter()
                        .find(|r| r.field_name == *name)
                        .cloned()
                        .ok_or_else(|| {
                            ConfigError::UnknownRelation {
                                model: entity.name.clone(),
                                field: name.clone(),
                            }
                            .into()
                        })
                })
                .collect(),
        }
    }

    fn walk<'a>(
        &'a self,
        session: &'a mut dyn Session,
        entity: &'a EntityDescriptor,
        row: &'a Row,
        include: &'a Include,
        path: &'a mut HashSet<PathKey>,
    ) -> BoxFuture<'a, Result<Value, AppError>> {
        Box::pin(async move {
            let key = path_key(entity, row.get(&entity.identity).unwrap_or(&Value::Null));
            path.insert(key.clone());

            let mut out = Map::new();
            for column in entity.output_columns() {
                let v = row.get(&column.name).cloned().unwrap_or(Value::Null);
                out.insert(column.name.clone(), v);
            }

            let nested = Include::All;
            for relation in self.relations(entity, include)? {
                let target = &relation.target;
                match &relation.kind {
                    RelationKind::OneToMany { linked_field } => {
                        let link = row.get(linked_field).cloned().unwrap_or(Value::Null);
                        if link.is_null() {
                            out.insert(relation.field_name.clone(), Value::Null);
                            continue;
                        }
                        if path.contains(&path_key(target, &link)) {
                            continue;
                        }
                        let related = session.query(target, &Filter::by_identity(target, link)).await?;
                        let value = match related.first() {
                            Some(child) => self.walk(&mut *session, target, child, &nested, &mut *path).await?,
                            None => Value::Null,
                        };
                        out.insert(relation.field_name.clone(), value);
                    }
                    RelationKind::ManyToMany { join, local_link, target_link } => {
                        let id = row.get(&entity.identity).cloned().unwrap_or(Value::Null);
                        let links = session.query(join, &Filter::new().eq(local_link.clone(), id)).await?;
                        let mut items = Vec::with_capacity(links.len());
                        for link in links {
                            let Some(target_id) = link.get(target_link).filter(|v| !v.is_null()).cloned() else {
                                continue;
                            };
                            if path.contains(&path_key(target, &target_id)) {
                                continue;
                            }
                            let related = session.query(target, &Filter::by_identity(target, target_id)).await?;
                            if let Some(child) = related.first() {
                                items.push(self.walk(&mut *session, target, child, &nested, &mut *path).await?);
                            }
                        }
                        out.insert(relation.field_name.clone(), Value::Array(items));
                    }
                }
            }

            path.remove(&key);
            Ok(Value::Object(out))
        })
    }
}
