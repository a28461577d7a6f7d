use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;

use crate::{Config, SensorConfig};

mod batches;
mod health;
mod quality;

// ---

/// Shared state: DB pool, runtime config and the read-only sensor config.
pub type AppState = (PgPool, Config, Arc<SensorConfig>);

pub fn router(pool: PgPool, config: Config, sensors: Arc<SensorConfig>) -> Router {
    // ---
    Router::new()
        .merge(batches::router())
        .merge(quality::router())
        .merge(health::router())
        .with_state((pool, config, sensors))
}
