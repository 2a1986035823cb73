//! Push delivery and the notification fan-out.
//!
//! [`push`] wraps a single Web Push delivery behind [`push::PushSender`];
//! [`dispatcher`] reads the registered subscriptions, collapses duplicate
//! endpoints and delivers one payload to each, isolating per-endpoint failures.

pub mod dispatcher;
pub mod push;
