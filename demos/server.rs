//! Example server: loads a model config (file or directory), picks Postgres when
//! DATABASE_URL is set and in-memory storage otherwise, and mounts common and entity routes.

use axum::Router;
use modelbind::{
    common_routes_with_ready, entity_routes, load_from_path, resolve, AppState, CrudEngine, MemoryStorage, PgStorage,
    Storage,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("modelbind=info".parse()?))
        .init();

    let config_source = std::env::var("MODELBIND_CONFIG").unwrap_or_else(|_| "demos/campus.json".into());
    let config = load_from_path(&config_source).await?;
    let model = Arc::new(resolve(&config)?);

    let storage: Arc<dyn Storage> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            tracing::info!("using postgres storage");
            Arc::new(PgStorage::connect(&url, 5).await?)
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
    };
    let state = AppState {
        engine: Arc::new(CrudEngine::new(model.registry.clone(), storage)),
        model,
    };

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api/v1", entity_routes(state));

    let addr = std::env::var("MODELBIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
