//! HTTP surface for the number notifier.
//!
//! - `GET /` — liveness text
//! - `GET /send-test` — push a fixed test notification to every subscriber

pub mod routes;
pub mod state;
