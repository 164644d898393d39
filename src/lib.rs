//! modelbind: relation-aware CRUD over validated schema models.
//!
//! Schema models bind to entity descriptors; a registry of relation descriptors drives
//! nested create/link on write and cycle-safe embedding on read.

pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod registry;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod storage;

pub use config::{load_from_path, load_from_str, resolve, FullConfig, ResolvedModel};
pub use error::{AppError, ConfigError};
pub use model::{FieldValue, NestedInput, RelationInput, SchemaInstance};
pub use registry::Registry;
pub use response::{success_many, success_one};
pub use routes::{common_routes, common_routes_with_ready, entity_routes};
pub use service::{CrudEngine, Include, Serializer};
pub use state::AppState;
pub use storage::{Filter, MemoryStorage, PgStorage, Row, Session, Storage};
