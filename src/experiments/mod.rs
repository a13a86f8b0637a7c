pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod upload;

pub use repo_types::ResultPolicy;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::synthesis_routes())
        .merge(handlers::reaction_routes())
        .merge(handlers::result_routes())
}
