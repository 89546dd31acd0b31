pub mod middleware;
pub mod v2;

use std::sync::Arc;

use axum::Router;

use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router<()> {
    Router::new()
        .nest("/v2", v2::create_v2_router())
        .layer(axum::middleware::from_fn(middleware::distribution_headers))
        .with_state(state)
}
