//! Raw config types matching the JSON declaration format (entities, schema models, endpoints).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// Storage type name (e.g. "integer", "text", "boolean", "uuid", "timestamptz").
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// Whether storage fills the column when an insert omits it.
    #[serde(default)]
    pub has_default: bool,
    /// Entity name this column is a foreign key to (points at that entity's identity).
    #[serde(default)]
    pub references: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// Storage table; defaults to `name`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    pub identity: String,
    pub columns: Vec<ColumnConfig>,
    /// Column names that must never be exposed in output (e.g. password hashes, secrets).
    #[serde(default)]
    pub hidden_columns: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// One declared field of a schema model: a column or a relation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Schema model used to parse nested values of a relation field.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(flatten)]
    pub rule: ValidationRule,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneToManyConfig {
    /// Target entity name.
    pub model: String,
    /// Local column holding the foreign key.
    pub linked_field: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManyToManyConfig {
    /// Target entity name.
    pub model: String,
    /// Join entity name.
    pub second_model: String,
    /// `[local_link_column, target_link_column]` on the join entity.
    pub linked_fields: Vec<String>,
}

/// Declarative relation block of a schema model. Only the two supported kinds are accepted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationsConfig {
    #[serde(default)]
    pub one_to_many: BTreeMap<String, OneToManyConfig>,
    #[serde(default)]
    pub many_to_many: BTreeMap<String, ManyToManyConfig>,
}

impl RelationsConfig {
    pub fn is_empty(&self) -> bool {
        self.one_to_many.is_empty() && self.many_to_many.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaModelConfig {
    pub name: String,
    /// Entity this model targets.
    pub entity: String,
    /// Exposed fields. Empty means every column of the entity, all optional.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldConfig>,
    #[serde(default)]
    pub relations: RelationsConfig,
}

/// HTTP exposure of one entity: each operation names the schema model it uses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub path_segment: String,
    #[serde(default)]
    pub create: Option<String>,
    #[serde(default)]
    pub read: Option<String>,
    #[serde(default)]
    pub update: Option<String>,
    /// Default for `include_relations` when the request does not say.
    #[serde(default)]
    pub include_relations: bool,
}

/// All config types in one document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub models: Vec<SchemaModelConfig>,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}
