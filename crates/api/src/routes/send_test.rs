//! Manual test dispatch.

use axum::Router;
use axum::extract::State;
use axum::routing::get;

use numcast_common::error::AppError;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/send-test", get(send_test))
}

/// GET /send-test — Push the test payload to every unique subscriber.
///
/// Partial delivery failure is reported in the body, never as an error
/// status; only a failed subscriber read is.
async fn send_test(State(state): State<AppState>) -> Result<String, AppError> {
    let report = state.dispatcher.send_test_notification().await?;
    if report.targeted == 0 {
        return Ok("No subscribers found.".to_string());
    }
    Ok(format!(
        "Notifications sent: {}, failed: {}",
        report.sent, report.failed
    ))
}
