//! Shared application state for all routes.

use crate::config::ResolvedModel;
use crate::service::CrudEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CrudEngine>,
    pub model: Arc<ResolvedModel>,
}
