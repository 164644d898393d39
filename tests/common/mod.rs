#![allow(dead_code)]

use modelbind::{load_from_str, resolve, CrudEngine, MemoryStorage, ResolvedModel, SchemaInstance};
use serde_json::Value;
use std::sync::Arc;

pub const CAMPUS: &str = include_str!("../../demos/campus.json");

pub struct Campus {
    pub model: Arc<ResolvedModel>,
    pub storage: MemoryStorage,
    pub engine: CrudEngine,
}

pub fn campus() -> Campus {
    let config = load_from_str(CAMPUS).expect("campus config parses");
    let model = Arc::new(resolve(&config).expect("campus config resolves"));
    let storage = MemoryStorage::new();
    let engine = CrudEngine::new(model.registry.clone(), Arc::new(storage.clone()));
    Campus { model, storage, engine }
}

impl Campus {
    /// Parse `body` against the named schema model.
    pub fn instance(&self, model: &str, body: Value) -> SchemaInstance {
        let registry = &self.model.registry;
        let model = registry.model(model).expect("model registered");
        SchemaInstance::from_json(registry, model, body).expect("valid instance")
    }

    pub async fn create(&self, model: &str, body: Value) -> Value {
        self.engine
            .create(&self.instance(model, body), false)
            .await
            .expect("create succeeds")
    }

    pub async fn count(&self, entity: &str) -> usize {
        self.storage.rows(entity).await.len()
    }
}
