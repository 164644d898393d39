//! Entity CRUD handlers: list, create, update, resolved per path segment.

use crate::config::{ResolvedEndpoint, SchemaModel};
use crate::error::AppError;
use crate::model::{parse_text, SchemaInstance};
use crate::response::{success_many, success_one, success_one_ok};
use crate::state::AppState;
use crate::storage::Filter;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const INCLUDE_RELATIONS: &str = "include_relations";

fn endpoint<'a>(state: &'a AppState, path_segment: &str) -> Result<&'a ResolvedEndpoint, AppError> {
    state
        .model
        .endpoint_by_path(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("no endpoint /{}", path_segment)))
}

fn operation<'a>(model: &'a Option<Arc<SchemaModel>>, name: &str) -> Result<&'a Arc<SchemaModel>, AppError> {
    model
        .as_ref()
        .ok_or_else(|| AppError::BadRequest(format!("{} not allowed", name)))
}

fn parse_flag(raw: &str) -> Result<bool, AppError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(AppError::BadRequest(format!("{} must be true or false", INCLUDE_RELATIONS))),
    }
}

/// GET /:path_segment: query-string pairs filter by equality on declared fields.
pub async fn list(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = endpoint(&state, &path_segment)?;
    let model = operation(&endpoint.read, "read")?;
    let include = match params.remove(INCLUDE_RELATIONS) {
        Some(raw) => parse_flag(&raw)?,
        None => endpoint.include_relations,
    };
    let filter = SchemaInstance::from_query(model, &params)?;
    let rows = state.engine.get_objects(&filter, include).await?;
    Ok(success_many(rows))
}

/// POST /:path_segment
pub async fn create(
    State(state): State<AppState>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = endpoint(&state, &path_segment)?;
    let model = operation(&endpoint.create, "create")?;
    let instance = SchemaInstance::from_json(&state.model.registry, model, body)?;
    let row = state.engine.create(&instance, endpoint.include_relations).await?;
    Ok(success_one(row))
}

/// PATCH /:path_segment/:id: updates the one row whose identity is `id`.
pub async fn update(
    State(state): State<AppState>,
    Path((path_segment, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = endpoint(&state, &path_segment)?;
    let model = operation(&endpoint.update, "update")?;
    let entity = model.entity();
    let id = match entity.identity_column() {
        Some(column) => parse_text(column, &id)?,
        None => Value::String(id),
    };
    let instance = SchemaInstance::from_json(&state.model.registry, model, body)?;
    let row = state
        .engine
        .update(&instance, &Filter::by_identity(entity, id), endpoint.include_relations)
        .await?;
    Ok(success_one_ok(row))
}
