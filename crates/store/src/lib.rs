//! Keyed change-notification store.
//!
//! Exposes point reads and three long-lived feeds (`child_added`,
//! `child_changed`, `value`) over a JSON tree addressed by `/`-separated
//! paths. [`firebase::FirebaseStore`] talks to a Firebase Realtime Database
//! over REST and Server-Sent Events; [`memory::MemoryStore`] (feature
//! `memory`) keeps the tree in process for tests.

pub mod credentials;
pub mod error;
pub mod feed;
pub mod firebase;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod mirror;
pub mod sse;

use async_trait::async_trait;
use serde_json::Value;

pub use error::StoreError;
pub use feed::{Feed, FeedKind, Snapshot};

/// The operations the notifier needs from the database.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// One-time point-in-time read. `None` when nothing is stored at `path`.
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Open a long-lived feed on `path`.
    ///
    /// Transport reconnection is handled internally. An `Err` item means the
    /// subscription failed for good; no further items follow it.
    fn subscribe(&self, path: &str, kind: FeedKind) -> Feed;
}
