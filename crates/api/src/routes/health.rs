//! Liveness endpoint.

use axum::Router;
use axum::routing::get;

use crate::state::AppState;

pub const LIVENESS_TEXT: &str = "Number notifier is running";

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(liveness))
}

async fn liveness() -> &'static str {
    LIVENESS_TEXT
}
