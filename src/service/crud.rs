//! Generic CRUD execution over a storage session, driven entirely by registered metadata.

use crate::config::{EntityDescriptor, SchemaModel};
use crate::error::AppError;
use crate::model::SchemaInstance;
use crate::registry::Registry;
use crate::service::resolver::Resolver;
use crate::service::serializer::{Include, Serializer};
use crate::service::RequestValidator;
use crate::storage::{Filter, Session, Storage};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CrudEngine {
    registry: Arc<Registry>,
    storage: Arc<dyn Storage>,
}

impl CrudEngine {
    pub fn new(registry: Arc<Registry>, storage: Arc<dyn Storage>) -> Self {
        Self { registry, storage }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Persist `instance` with its relation graph. Returns the stored row as re-read after
    /// insert, so storage defaults show.
    pub async fn create(&self, instance: &SchemaInstance, include_relations: bool) -> Result<Value, AppError> {
        let mut session = self.storage.begin().await?;
        let result = self.create_in(session.as_mut(), instance, include_relations).await;
        release(session, result).await
    }

    /// Rows matching every set scalar field of `filter`. No match is an empty list.
    pub async fn get_objects(&self, filter: &SchemaInstance, include_relations: bool) -> Result<Vec<Value>, AppError> {
        let model = filter.model();
        let criteria = filter_from_instance(filter);
        check_filter(model.entity(), &criteria)?;

        let mut session = self.storage.begin().await?;
        let result = self.list_in(session.as_mut(), model, &criteria, include_relations).await;
        release(session, result).await
    }

    /// Update the single row matching `filter`. Zero matches is `NotFound`; more than one is
    /// `AmbiguousUpdate` and nothing is written.
    pub async fn update(
        &self,
        instance: &SchemaInstance,
        filter: &Filter,
        include_relations: bool,
    ) -> Result<Value, AppError> {
        let mut session = self.storage.begin().await?;
        let result = self
            .update_in(session.as_mut(), instance, filter, include_relations, false)
            .await
            .map(|mut rows| rows.pop().unwrap_or(Value::Null));
        release(session, result).await
    }

    /// Update every row matching `filter`. Zero matches is still `NotFound`.
    pub async fn update_bulk(
        &self,
        instance: &SchemaInstance,
        filter: &Filter,
        include_relations: bool,
    ) -> Result<Vec<Value>, AppError> {
        let mut session = self.storage.begin().await?;
        let result = self
            .update_in(session.as_mut(), instance, filter, include_relations, true)
            .await;
        release(session, result).await
    }

    async fn create_in(
        &self,
        session: &mut dyn Session,
        instance: &SchemaInstance,
        include_relations: bool,
    ) -> Result<Value, AppError> {
        let model = instance.model();
        RequestValidator::check_required(model, |f| instance.is_populated(f))?;

        let id = Resolver::new(&self.registry).create(session, instance).await?;
        let entity = model.entity();
        let row = fetch_by_identity(session, entity, &id).await?;
        Serializer::new(&self.registry)
            .serialize(session, entity, &row, &Include::for_model(model, include_relations))
            .await
    }

    async fn list_in(
        &self,
        session: &mut dyn Session,
        model: &SchemaModel,
        criteria: &Filter,
        include_relations: bool,
    ) -> Result<Vec<Value>, AppError> {
        let entity = model.entity();
        let rows = session.query(entity, criteria).await?;
        debug!(entity = %entity.name, matched = rows.len(), "get_objects");

        let serializer = Serializer::new(&self.registry);
        let include = Include::for_model(model, include_relations);
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(serializer.serialize(session, entity, row, &include).await?);
        }
        Ok(out)
    }

    async fn update_in(
        &self,
        session: &mut dyn Session,
        instance: &SchemaInstance,
        filter: &Filter,
        include_relations: bool,
        bulk: bool,
    ) -> Result<Vec<Value>, AppError> {
        let model = instance.model();
        let entity = model.entity();
        check_filter(entity, filter)?;

        let matched = session.query(entity, filter).await?;
        match matched.len() {
            0 => {
                return Err(AppError::NotFound(format!("no {} matches {:?}", entity.name, filter)));
            }
            n if n > 1 && !bulk => return Err(AppError::AmbiguousUpdate { matched: n }),
            _ => {}
        }
        let targets: Vec<Value> = matched
            .iter()
            .map(|row| row.get(&entity.identity).cloned().unwrap_or(Value::Null))
            .collect();

        let ids = Resolver::new(&self.registry).update(session, instance, &targets).await?;
        debug!(entity = %entity.name, updated = ids.len(), "update");

        let serializer = Serializer::new(&self.registry);
        let include = Include::for_model(model, include_relations);
        let mut out = Vec::with_capacity(ids.len());
        for id in &ids {
            let row = fetch_by_identity(session, entity, id).await?;
            out.push(serializer.serialize(session, entity, &row, &include).await?);
        }
        Ok(out)
    }
}

/// Equality filter over the set scalar fields of `instance`. Relation fields are not filterable.
fn filter_from_instance(instance: &SchemaInstance) -> Filter {
    let skipped = instance.fields().count() - instance.scalar_fields().count();
    if skipped > 0 {
        debug!(model = %instance.model().name, skipped, "relation fields ignored in filter");
    }
    instance
        .scalar_fields()
        .map(|(name, v)| (name, v.clone()))
        .collect()
}

fn check_filter(entity: &EntityDescriptor, filter: &Filter) -> Result<(), AppError> {
    match filter.iter().find(|(column, _)| !entity.has_column(column)) {
        Some((column, _)) => Err(AppError::BadRequest(format!(
            "{} has no column {} to filter on",
            entity.name, column
        ))),
        None => Ok(()),
    }
}

async fn fetch_by_identity(
    session: &mut dyn Session,
    entity: &EntityDescriptor,
    id: &Value,
) -> Result<crate::storage::Row, AppError> {
    session
        .query(entity, &Filter::by_identity(entity, id.clone()))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("{} with {} = {}", entity.name, entity.identity, id)))
}

/// Commit on success; roll back and hand the original error back otherwise.
async fn release<T>(session: Box<dyn Session>, result: Result<T, AppError>) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(e) => {
            warn!(error = %e, "rolling back session");
            if let Err(rollback) = session.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}
