//! Builds parameterized INSERT, SELECT, UPDATE from entity descriptors.

use crate::config::{ColumnType, EntityDescriptor};
use crate::storage::{Filter, Row};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Table name, schema-qualified when the entity declares a schema.
fn qualified_table(entity: &EntityDescriptor) -> String {
    match &entity.schema_name {
        Some(schema) => format!("{}.{}", quoted(schema), quoted(&entity.table_name)),
        None => quoted(&entity.table_name),
    }
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its placeholder, cast by the column's storage type.
    /// Scalars headed for a json column go in as their JSON text so the cast parses them.
    fn placeholder(&mut self, entity: &EntityDescriptor, column: &str, v: Value) -> String {
        let data_type = entity.column(column).map(|c| c.data_type);
        let v = match (data_type, v) {
            (Some(ColumnType::Json), v @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
                Value::String(v.to_string())
            }
            (_, v) => v,
        };
        self.params.push(v);
        let n = self.params.len();
        match data_type.and_then(|t| t.pg_cast()) {
            Some(cast) => format!("${}::{}", n, cast),
            None => format!("${}", n),
        }
    }

    fn where_clause(&mut self, entity: &EntityDescriptor, filter: &Filter) -> String {
        let parts: Vec<String> = filter
            .iter()
            .map(|(col, v)| {
                if v.is_null() {
                    format!("{} IS NULL", quoted(col))
                } else {
                    let ph = self.placeholder(entity, col, v.clone());
                    format!("{} = {}", quoted(col), ph)
                }
            })
            .collect();
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }
}

/// SELECT list: numeric as col::text so the decoder receives a String.
fn select_column_list(entity: &EntityDescriptor) -> String {
    entity
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            if c.data_type == ColumnType::Numeric {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// SELECT rows matching the filter (exact match per column), in identity order.
pub fn select_where(entity: &EntityDescriptor, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(entity, filter);
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        select_column_list(entity),
        qualified_table(entity),
        where_clause,
        quoted(&entity.identity)
    );
    q
}

/// INSERT the given columns; omitted columns take their storage default. Returns the identity.
pub fn insert(entity: &EntityDescriptor, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(entity);
    let returning = quoted(&entity.identity);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &entity.columns {
        let Some(v) = row.get(&c.name) else { continue };
        if c.name == entity.identity && v.is_null() {
            continue;
        }
        placeholders.push(q.placeholder(entity, &c.name, v.clone()));
        cols.push(quoted(&c.name));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE rows matching the filter: SET only the given columns known to the entity.
pub fn update_where(entity: &EntityDescriptor, filter: &Filter, values: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let sets: Vec<String> = entity
        .columns
        .iter()
        .filter_map(|c| values.get(&c.name).map(|v| (c, v)))
        .map(|(c, v)| {
            let ph = q.placeholder(entity, &c.name, v.clone());
            format!("{} = {}", quoted(&c.name), ph)
        })
        .collect();
    let where_clause = q.where_clause(entity, filter);
    q.sql = format!(
        "UPDATE {} SET {}{}",
        qualified_table(entity),
        sets.join(", "),
        where_clause
    );
    q
}
