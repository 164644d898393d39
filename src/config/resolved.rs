//! Resolved descriptors: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use crate::registry::Registry;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Storage type of a column, used for query-string coercion and SQL casts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Float,
    Numeric,
    Boolean,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Json,
    Text,
}

impl ColumnType {
    pub fn parse(type_name: Option<&str>) -> Self {
        let Some(name) = type_name else {
            return ColumnType::Text;
        };
        let lower = name.to_lowercase();
        if lower.contains("uuid") {
            ColumnType::Uuid
        } else if lower.contains("bigserial") || lower.contains("bigint") || lower == "int8" {
            ColumnType::BigInt
        } else if lower.contains("serial") || lower.contains("int") {
            ColumnType::Integer
        } else if lower.starts_with("bool") {
            ColumnType::Boolean
        } else if lower == "real" || lower.starts_with("double") || lower.starts_with("float") {
            ColumnType::Float
        } else if lower.starts_with("numeric") || lower.starts_with("decimal") {
            ColumnType::Numeric
        } else if lower == "timestamptz" || lower == "timestamp with time zone" {
            ColumnType::TimestampTz
        } else if lower.starts_with("timestamp") {
            ColumnType::Timestamp
        } else if lower == "date" {
            ColumnType::Date
        } else if lower.starts_with("json") {
            ColumnType::Json
        } else {
            ColumnType::Text
        }
    }

    /// PostgreSQL cast applied to bound parameters. Every parameter binds untyped or as text
    /// when null, so only text columns go without one.
    pub fn pg_cast(&self) -> Option<&'static str> {
        match self {
            ColumnType::Integer => Some("int4"),
            ColumnType::BigInt => Some("int8"),
            ColumnType::Float => Some("float8"),
            ColumnType::Numeric => Some("numeric"),
            ColumnType::Boolean => Some("bool"),
            ColumnType::Uuid => Some("uuid"),
            ColumnType::Timestamp => Some("timestamp"),
            ColumnType::TimestampTz => Some("timestamptz"),
            ColumnType::Date => Some("date"),
            ColumnType::Json => Some("jsonb"),
            ColumnType::Text => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ForeignKey {
    pub entity: String,
    pub column: String,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub has_default: bool,
    pub references: Option<ForeignKey>,
}

/// One storage-side record type. Immutable after resolve.
#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    pub name: String,
    pub schema_name: Option<String>,
    pub table_name: String,
    pub identity: String,
    pub columns: Vec<ColumnInfo>,
    pub hidden: HashSet<String>,
}

impl EntityDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn identity_column(&self) -> Option<&ColumnInfo> {
        self.column(&self.identity)
    }

    /// Columns that appear in serialized output.
    pub fn output_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| !self.hidden.contains(&c.name))
    }
}

#[derive(Clone, Debug)]
pub enum RelationKind {
    /// Foreign key on the owning entity pointing at the target's identity.
    OneToMany { linked_field: String },
    /// Association rows in a distinct join entity.
    ManyToMany {
        join: Arc<EntityDescriptor>,
        local_link: String,
        target_link: String,
    },
}

#[derive(Clone, Debug)]
pub struct RelationDescriptor {
    pub field_name: String,
    /// Name of the entity the relation is declared on.
    pub owner: String,
    pub target: Arc<EntityDescriptor>,
    pub kind: RelationKind,
}

impl RelationDescriptor {
    /// True when both descriptors wire the same columns to the same entities.
    pub fn same_shape(&self, other: &RelationDescriptor) -> bool {
        if self.target.name != other.target.name {
            return false;
        }
        match (&self.kind, &other.kind) {
            (RelationKind::OneToMany { linked_field: a }, RelationKind::OneToMany { linked_field: b }) => a == b,
            (
                RelationKind::ManyToMany { join: j1, local_link: l1, target_link: t1 },
                RelationKind::ManyToMany { join: j2, local_link: l2, target_link: t2 },
            ) => j1.name == j2.name && l1 == l2 && t1 == t2,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    /// Schema model for nested values (relation fields only).
    pub nested_model: Option<String>,
    pub rule: ValidationRule,
    /// `rule.pattern`, compiled when the model is registered.
    pub pattern: Option<Regex>,
}

impl FieldSpec {
    /// Optional field with no rule.
    pub fn plain(name: impl Into<String>) -> Self {
        FieldSpec {
            name: name.into(),
            required: false,
            nested_model: None,
            rule: ValidationRule::default(),
            pattern: None,
        }
    }

    /// Field governed by `rule`; fails when `rule.pattern` is not a valid regex.
    pub fn with_rule(
        name: impl Into<String>,
        rule: ValidationRule,
        nested_model: Option<String>,
    ) -> Result<Self, regex::Error> {
        let pattern = rule.pattern.as_deref().map(Regex::new).transpose()?;
        Ok(FieldSpec {
            name: name.into(),
            required: rule.required == Some(true),
            nested_model,
            rule,
            pattern,
        })
    }
}

/// A validated request/response shape over one entity.
#[derive(Clone, Debug)]
pub struct SchemaModel {
    pub name: String,
    pub entity: Arc<EntityDescriptor>,
    pub fields: Vec<FieldSpec>,
    pub relations: Vec<Arc<RelationDescriptor>>,
}

impl SchemaModel {
    /// Every column of the entity, all optional, no relations. Used for nested values that
    /// name no model of their own.
    pub fn permissive(entity: Arc<EntityDescriptor>) -> Self {
        let fields = entity
            .columns
            .iter()
            .map(|c| FieldSpec::plain(c.name.clone()))
            .collect();
        SchemaModel {
            name: entity.name.clone(),
            entity,
            fields,
            relations: Vec::new(),
        }
    }

    pub fn entity(&self) -> &Arc<EntityDescriptor> {
        &self.entity
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, field: &str) -> Option<&Arc<RelationDescriptor>> {
        self.relations.iter().find(|r| r.field_name == field)
    }

    pub fn relation_fields(&self) -> Vec<String> {
        self.relations.iter().map(|r| r.field_name.clone()).collect()
    }
}

/// Schema models bound to one HTTP path segment.
#[derive(Clone, Debug)]
pub struct ResolvedEndpoint {
    pub path_segment: String,
    pub create: Option<Arc<SchemaModel>>,
    pub read: Option<Arc<SchemaModel>>,
    pub update: Option<Arc<SchemaModel>>,
    pub include_relations: bool,
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub registry: Arc<Registry>,
    pub endpoint_by_path: HashMap<String, ResolvedEndpoint>,
}

impl ResolvedModel {
    pub fn endpoint_by_path(&self, path: &str) -> Option<&ResolvedEndpoint> {
        self.endpoint_by_path.get(path)
    }
}
