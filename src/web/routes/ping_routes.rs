use axum::{Json, Router, extract::State, routing::get};
use std::sync::Arc;

use crate::db::entities::ping_result;
use crate::web::{AppError, AppState};

async fn get_ping_results_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<ping_result::Model>>, AppError> {
    let results = app_state.store.list_all().await?;
    Ok(Json(results))
}

pub fn ping_router() -> Router<Arc<AppState>> {
    Router::new().route("/ping-results", get(get_ping_results_handler))
}
