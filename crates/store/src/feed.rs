use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Which change notifications a feed delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// A direct child appeared. Existing children are replayed on first load.
    ChildAdded,
    /// An existing direct child's value changed.
    ChildChanged,
    /// The whole subtree, on first load and after every change.
    Value,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::ChildAdded => write!(f, "child_added"),
            FeedKind::ChildChanged => write!(f, "child_changed"),
            FeedKind::Value => write!(f, "value"),
        }
    }
}

/// A keyed view of the affected subtree.
///
/// For child feeds `key` is the child's key; for value feeds it is the last
/// segment of the subscribed path.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub key: String,
    pub value: Value,
}

pub type FeedSender = mpsc::UnboundedSender<Result<Snapshot, StoreError>>;

/// Receiving end of a subscription. Dropping it stops the subscription.
pub type Feed = mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>;

pub fn channel() -> (FeedSender, Feed) {
    mpsc::unbounded_channel()
}

/// A feed that fails immediately with `err`.
pub fn failed(err: StoreError) -> Feed {
    let (tx, rx) = channel();
    let _ = tx.send(Err(err));
    rx
}
