//! In-memory transactional storage.
//!
//! A session holds the database lock for its whole lifetime and writes to a staged copy;
//! commit publishes the copy, rollback or drop throws it away. Identity, `unique`,
//! non-null and foreign-key constraints declared on entities are enforced.

use crate::config::{ColumnType, EntityDescriptor};
use crate::error::AppError;
use crate::storage::{Filter, Row, Session, Storage};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Table {
    rows: Vec<Row>,
    last_id: i64,
}

#[derive(Clone, Debug, Default)]
struct Database {
    tables: HashMap<String, Table>,
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    db: Arc<Mutex<Database>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of an entity, in insertion order.
    pub async fn rows(&self, entity: &str) -> Vec<Row> {
        let db = self.db.lock().await;
        db.tables.get(entity).map(|t| t.rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn Session>, AppError> {
        let guard = self.db.clone().lock_owned().await;
        let staged = (*guard).clone();
        tracing::debug!("memory session begin");
        Ok(Box::new(MemorySession { guard, staged }))
    }
}

pub struct MemorySession {
    guard: OwnedMutexGuard<Database>,
    staged: Database,
}

impl MemorySession {
    fn rows(&self, entity: &str) -> &[Row] {
        self.staged
            .tables
            .get(entity)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }

    fn check_columns<'a>(
        entity: &EntityDescriptor,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), AppError> {
        for column in columns {
            if !entity.has_column(column) {
                return Err(AppError::StorageConstraint(format!(
                    "{} has no column {}",
                    entity.table_name, column
                )));
            }
        }
        Ok(())
    }

    /// Constraint check for `row` as it would be stored; `position` is the row's own slot on update.
    /// A storage default only covers a column the write leaves out of `written`.
    fn check_row(
        &self,
        entity: &EntityDescriptor,
        row: &Row,
        written: &Row,
        position: Option<usize>,
    ) -> Result<(), AppError> {
        let existing = self.rows(&entity.name);
        for col in &entity.columns {
            let v = row.get(&col.name).unwrap_or(&Value::Null);
            if v.is_null() {
                let defaulted = col.has_default && !written.contains_key(&col.name);
                if !col.nullable && !defaulted {
                    return Err(AppError::StorageConstraint(format!(
                        "null value in {}.{} violates not-null constraint",
                        entity.table_name, col.name
                    )));
                }
                continue;
            }
            if col.unique || col.name == entity.identity {
                let clash = existing
                    .iter()
                    .enumerate()
                    .any(|(i, r)| Some(i) != position && r.get(&col.name) == Some(v));
                if clash {
                    return Err(AppError::StorageConstraint(format!(
                        "duplicate value {} for unique {}.{}",
                        v, entity.table_name, col.name
                    )));
                }
            }
            if let Some(fk) = &col.references {
                let found = self.rows(&fk.entity).iter().any(|r| r.get(&fk.column) == Some(v));
                if !found {
                    return Err(AppError::StorageConstraint(format!(
                        "{}.{} = {} references missing {} row",
                        entity.table_name, col.name, v, fk.entity
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn insert(&mut self, entity: &EntityDescriptor, row: &Row) -> Result<Value, AppError> {
        Self::check_columns(entity, row.keys().map(String::as_str))?;
        let id = match row.get(&entity.identity) {
            Some(v) if !v.is_null() => v.clone(),
            _ if entity.identity_column().map(|c| c.data_type) == Some(ColumnType::Uuid) => {
                Value::String(uuid::Uuid::new_v4().to_string())
            }
            _ => {
                let last = self.staged.tables.get(&entity.name).map_or(0, |t| t.last_id);
                Value::from(last + 1)
            }
        };
        let stored: Row = entity
            .columns
            .iter()
            .map(|c| {
                let v = if c.name == entity.identity {
                    id.clone()
                } else {
                    row.get(&c.name).cloned().unwrap_or(Value::Null)
                };
                (c.name.clone(), v)
            })
            .collect();
        self.check_row(entity, &stored, row, None)?;

        tracing::debug!(entity = %entity.name, id = %id, "insert");
        let table = self.staged.tables.entry(entity.name.clone()).or_default();
        if let Some(n) = id.as_i64() {
            table.last_id = table.last_id.max(n);
        }
        table.rows.push(stored);
        Ok(id)
    }

    async fn update(&mut self, entity: &EntityDescriptor, filter: &Filter, values: &Row) -> Result<u64, AppError> {
        Self::check_columns(entity, values.keys().map(String::as_str))?;
        Self::check_columns(entity, filter.iter().map(|(c, _)| c))?;
        let positions: Vec<usize> = self
            .rows(&entity.name)
            .iter()
            .enumerate()
            .filter(|(_, r)| filter.matches(r))
            .map(|(i, _)| i)
            .collect();
        for &i in &positions {
            let mut candidate = self.rows(&entity.name)[i].clone();
            for (k, v) in values {
                candidate.insert(k.clone(), v.clone());
            }
            self.check_row(entity, &candidate, values, Some(i))?;
            if let Some(table) = self.staged.tables.get_mut(&entity.name) {
                table.rows[i] = candidate;
            }
        }
        tracing::debug!(entity = %entity.name, rows = positions.len(), "update");
        Ok(positions.len() as u64)
    }

    async fn query(&mut self, entity: &EntityDescriptor, filter: &Filter) -> Result<Vec<Row>, AppError> {
        Self::check_columns(entity, filter.iter().map(|(c, _)| c))?;
        let rows: Vec<Row> = self
            .rows(&entity.name)
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        tracing::debug!(entity = %entity.name, filter = ?filter, rows = rows.len(), "query");
        Ok(rows)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemorySession { mut guard, staged } = *self;
        *guard = staged;
        tracing::debug!("memory session commit");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        tracing::debug!("memory session rollback");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_entity, EntityConfig};
    use serde_json::json;

    fn entity(json: Value) -> EntityDescriptor {
        let cfg: EntityConfig = serde_json::from_value(json).unwrap();
        resolve_entity(&cfg, &HashMap::new())
    }

    fn row(json: Value) -> Row {
        match json {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn events() -> EntityDescriptor {
        entity(json!({
            "name": "events", "identity": "id",
            "columns": [
                { "name": "id", "type": "bigserial", "has_default": true },
                { "name": "title", "nullable": false },
                { "name": "created_at", "type": "timestamptz", "nullable": false, "has_default": true }
            ]
        }))
    }

    #[tokio::test]
    async fn omitted_default_column_is_accepted() {
        let storage = MemoryStorage::new();
        let events = events();
        let mut session = storage.begin().await.unwrap();
        let id = session.insert(&events, &row(json!({ "title": "Open day" }))).await.unwrap();
        assert_eq!(id, json!(1));
        session.commit().await.unwrap();
        assert_eq!(storage.rows("events").await.len(), 1);
    }

    #[tokio::test]
    async fn explicit_null_into_default_column_violates_not_null() {
        let storage = MemoryStorage::new();
        let events = events();
        let mut session = storage.begin().await.unwrap();
        let err = session
            .insert(&events, &row(json!({ "title": "Open day", "created_at": null })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageConstraint(_)), "{err:?}");

        session.insert(&events, &row(json!({ "title": "Open day" }))).await.unwrap();
        let err = session
            .update(&events, &Filter::new().eq("id", json!(1)), &row(json!({ "created_at": null })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageConstraint(_)), "{err:?}");

        let touched = session
            .update(&events, &Filter::new().eq("id", json!(1)), &row(json!({ "title": "Fair" })))
            .await
            .unwrap();
        assert_eq!(touched, 1);
        session.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn uuid_identities_are_generated_as_uuids() {
        let storage = MemoryStorage::new();
        let tokens = entity(json!({
            "name": "tokens", "identity": "id",
            "columns": [{ "name": "id", "type": "uuid", "has_default": true }, { "name": "label" }]
        }));
        let mut session = storage.begin().await.unwrap();
        let first = session.insert(&tokens, &row(json!({ "label": "a" }))).await.unwrap();
        let second = session.insert(&tokens, &row(json!({ "label": "b" }))).await.unwrap();
        session.commit().await.unwrap();

        let first = first.as_str().unwrap();
        assert!(uuid::Uuid::parse_str(first).is_ok());
        assert_ne!(Some(first), second.as_str());
        assert_eq!(storage.rows("tokens").await[0]["id"], json!(first));
    }
}
