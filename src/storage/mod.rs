//! Storage capability consumed by the engine: scoped transactional sessions.
//!
//! A session is acquired per top-level call and released exactly once, by `commit` or
//! `rollback`. Dropping an unreleased session discards its writes.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

use crate::config::EntityDescriptor;
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

/// One stored record as column name -> value.
pub type Row = serde_json::Map<String, Value>;

/// Conjunction of column equalities. An empty filter matches every row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(Vec<(String, Value)>);

impl Filter {
    pub fn new() -> Self {
        Filter(Vec::new())
    }

    pub fn eq(mut self, column: impl Into<String>, value: Value) -> Self {
        self.0.push((column.into(), value));
        self
    }

    pub fn by_identity(entity: &EntityDescriptor, id: Value) -> Self {
        Filter::new().eq(entity.identity.clone(), id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.0
            .iter()
            .all(|(col, v)| row.get(col).unwrap_or(&Value::Null) == v)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Filter(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[async_trait]
pub trait Session: Send {
    /// Insert one row; returns the stored identity (assigned by storage when omitted).
    async fn insert(&mut self, entity: &EntityDescriptor, row: &Row) -> Result<Value, AppError>;

    /// Assign `values` on every row matching `filter`; returns the number of rows touched.
    async fn update(&mut self, entity: &EntityDescriptor, filter: &Filter, values: &Row) -> Result<u64, AppError>;

    /// Rows matching `filter`, in storage order.
    async fn query(&mut self, entity: &EntityDescriptor, filter: &Filter) -> Result<Vec<Row>, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Session>, AppError>;
}
