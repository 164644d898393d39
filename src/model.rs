//! Schema instances: per-request values of a schema model.
//!
//! A field is *set* when it appears in the instance, even when its value is `null`. Only set
//! fields constrain a filter or get applied by an update. Nested relation values are tagged
//! once, here, as either a reference to an existing row or a full value to create.

use crate::config::{ColumnInfo, ColumnType, EntityDescriptor, RelationDescriptor, RelationKind, SchemaModel};
use crate::error::AppError;
use crate::registry::Registry;
use crate::service::RequestValidator;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum NestedInput {
    /// Link an existing row by identity.
    ByReference(Value),
    /// Create a new row from a nested instance, then link it.
    ByValue(SchemaInstance),
}

#[derive(Clone, Debug)]
pub enum RelationInput {
    One(NestedInput),
    Many(Vec<NestedInput>),
}

#[derive(Clone, Debug)]
pub enum FieldValue {
    Scalar(Value),
    Relation(RelationInput),
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Scalar(v)
    }
}

impl From<RelationInput> for FieldValue {
    fn from(r: RelationInput) -> Self {
        FieldValue::Relation(r)
    }
}

impl From<NestedInput> for FieldValue {
    fn from(n: NestedInput) -> Self {
        FieldValue::Relation(RelationInput::One(n))
    }
}

impl From<Vec<NestedInput>> for FieldValue {
    fn from(items: Vec<NestedInput>) -> Self {
        FieldValue::Relation(RelationInput::Many(items))
    }
}

#[derive(Clone, Debug)]
pub struct SchemaInstance {
    model: Arc<SchemaModel>,
    fields: Vec<(String, FieldValue)>,
}

impl SchemaInstance {
    pub fn new(model: Arc<SchemaModel>) -> Self {
        SchemaInstance {
            model,
            fields: Vec::new(),
        }
    }

    /// Builder form of [`SchemaInstance::set`].
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field.to_string(), value)),
        }
    }

    pub fn model(&self) -> &Arc<SchemaModel> {
        &self.model
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Set to something other than a scalar `null`.
    pub fn is_populated(&self, field: &str) -> bool {
        match self.get(field) {
            Some(FieldValue::Scalar(v)) => !v.is_null(),
            Some(FieldValue::Relation(_)) => true,
            None => false,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields().filter_map(|(name, v)| match v {
            FieldValue::Scalar(s) => Some((name, s)),
            FieldValue::Relation(_) => None,
        })
    }

    /// Parse and validate a JSON object against `model`. Undeclared keys are ignored; a
    /// `null` relation value counts as unset.
    pub fn from_json(registry: &Registry, model: &Arc<SchemaModel>, body: Value) -> Result<Self, AppError> {
        let Value::Object(map) = body else {
            return Err(AppError::BadRequest(format!("{} body must be a JSON object", model.name)));
        };
        let mut instance = SchemaInstance::new(model.clone());
        for (key, value) in map {
            if let Some(relation) = model.relation(&key) {
                if value.is_null() {
                    continue;
                }
                let nested = registry
                    .nested_model(model, &key)
                    .unwrap_or_else(|| Arc::new(SchemaModel::permissive(relation.target.clone())));
                let input = RelationInput::from_json(registry, relation, &nested, value)?;
                instance.fields.push((key, FieldValue::Relation(input)));
            } else if let Some(spec) = model.field(&key) {
                let column = model.entity.column(&key);
                if matches!(value, Value::Array(_) | Value::Object(_))
                    && column.map(|c| c.data_type) != Some(ColumnType::Json)
                {
                    return Err(AppError::BadRequest(format!("{} must be a scalar", key)));
                }
                RequestValidator::check_field(spec, &value)?;
                instance.fields.push((key, FieldValue::Scalar(value)));
            } else {
                tracing::debug!(model = %model.name, field = %key, "ignoring undeclared field");
            }
        }
        RequestValidator::check_required(model, |name| instance.is_populated(name))?;
        Ok(instance)
    }

    /// Build a filter-bearing instance from query-string pairs. Only declared column fields
    /// are taken; values are parsed by column type.
    pub fn from_query(model: &Arc<SchemaModel>, params: &HashMap<String, String>) -> Result<Self, AppError> {
        let mut instance = SchemaInstance::new(model.clone());
        for field in &model.fields {
            let (Some(raw), Some(column)) = (params.get(&field.name), model.entity.column(&field.name)) else {
                continue;
            };
            instance.set(&field.name, parse_text(column, raw)?);
        }
        Ok(instance)
    }
}

impl RelationInput {
    fn from_json(
        registry: &Registry,
        relation: &RelationDescriptor,
        nested: &Arc<SchemaModel>,
        value: Value,
    ) -> Result<Self, AppError> {
        let target = relation.target.as_ref();
        match (&relation.kind, value) {
            (RelationKind::OneToMany { .. }, Value::Array(_)) => Err(AppError::BadRequest(format!(
                "{} takes a single value",
                relation.field_name
            ))),
            (RelationKind::OneToMany { .. }, v) => {
                Ok(RelationInput::One(NestedInput::from_json(registry, target, nested, v)?))
            }
            (RelationKind::ManyToMany { .. }, Value::Array(items)) => items
                .into_iter()
                .map(|v| NestedInput::from_json(registry, target, nested, v))
                .collect::<Result<Vec<_>, _>>()
                .map(RelationInput::Many),
            (RelationKind::ManyToMany { .. }, v) => Ok(RelationInput::Many(vec![NestedInput::from_json(
                registry, target, nested, v,
            )?])),
        }
    }
}

impl NestedInput {
    /// A bare scalar, or an object carrying only the identity field, is a reference; any
    /// other object is a value to create. Textual references are parsed by the target's
    /// identity type.
    fn from_json(
        registry: &Registry,
        target: &EntityDescriptor,
        nested: &Arc<SchemaModel>,
        value: Value,
    ) -> Result<Self, AppError> {
        let identity = target.identity.as_str();
        match value {
            Value::Number(_) | Value::String(_) => Ok(NestedInput::ByReference(reference(target, value)?)),
            Value::Object(mut map) if map.len() == 1 && map.contains_key(identity) => {
                match map.remove(identity) {
                    Some(id) if !id.is_null() => Ok(NestedInput::ByReference(reference(target, id)?)),
                    _ => Err(AppError::BadRequest(format!("{} reference must not be null", nested.name))),
                }
            }
            Value::Object(map) => Ok(NestedInput::ByValue(SchemaInstance::from_json(
                registry,
                nested,
                Value::Object(map),
            )?)),
            other => Err(AppError::BadRequest(format!(
                "{} expects an object or an identity, got {}",
                nested.name, other
            ))),
        }
    }
}

fn reference(target: &EntityDescriptor, id: Value) -> Result<Value, AppError> {
    match (&id, target.identity_column()) {
        (Value::String(s), Some(column)) => parse_text(column, s),
        _ => Ok(id),
    }
}

/// Parse a textual value (query string, path segment, string reference) by column type.
/// Types the database parses from text itself (timestamps, numeric, json) stay strings.
pub fn parse_text(column: &ColumnInfo, s: &str) -> Result<Value, AppError> {
    let invalid = |what: &str| AppError::BadRequest(format!("{}: {:?} is not a valid {}", column.name, s, what));
    match column.data_type {
        ColumnType::Integer | ColumnType::BigInt => s
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid("integer")),
        ColumnType::Float => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("number")),
        ColumnType::Boolean => {
            if s.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if s.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(invalid("boolean"))
            }
        }
        ColumnType::Uuid => uuid::Uuid::parse_str(s)
            .map(|u| Value::String(u.to_string()))
            .map_err(|_| invalid("uuid")),
        _ => Ok(Value::String(s.to_string())),
    }
}

/// Plain column map of an instance, in field order.
pub(crate) fn scalar_row(instance: &SchemaInstance) -> Map<String, Value> {
    instance
        .scalar_fields()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
