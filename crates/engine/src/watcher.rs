//! Per-game change watchers.
//!
//! Two feeds can announce today's number, depending on how the publisher
//! writes it:
//! - a partial update of one date fires `child_changed` on the game
//!   (handled by [`run_field_change_watcher`]);
//! - a full overwrite of the game fires `value` (handled by
//!   [`run_snapshot_watcher`]).
//!
//! Both hand their candidates to [`Pipeline::notify`], which gates on the
//! shared dedup cache.

use serde_json::Value;

use numcast_common::types::ValueRecord;
use numcast_store::Feed;

use crate::context::Pipeline;

/// The number to announce for a changed date child, if it is today's.
pub fn field_change_candidate(date: &str, value: &Value, today: &str) -> Option<String> {
    if date != today {
        return None;
    }
    ValueRecord::from_value(value)?.number_text()
}

/// Last-Known-Number tracking for the snapshot watcher.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    last_known: Option<String>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_known(&self) -> Option<&str> {
        self.last_known.as_deref()
    }

    /// Observe a full game snapshot and return today's number if it is new.
    ///
    /// Repeated snapshots carrying the same number yield nothing. A snapshot
    /// without a record for today forgets the last known number.
    pub fn observe(&mut self, game_value: &Value, today: &str) -> Option<String> {
        let Some(record) = game_value.get(today).and_then(ValueRecord::from_value) else {
            self.last_known = None;
            return None;
        };

        let number = record.number_text();
        if number == self.last_known {
            return None;
        }
        self.last_known = number.clone();
        number
    }
}

/// Watch `child_changed` on one game.
pub async fn run_field_change_watcher(pipeline: Pipeline, game: String, mut feed: Feed) {
    let cancel = pipeline.cancel_token();
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = feed.recv() => item,
        };
        match item {
            Some(Ok(snapshot)) => {
                let today = pipeline.today();
                if let Some(number) = field_change_candidate(&snapshot.key, &snapshot.value, &today)
                {
                    tracing::debug!(game = %game, date = %today, number = %number, "Field change carries today's number");
                    pipeline.notify(&game, &today, &number).await;
                }
            }
            Some(Err(e)) => {
                tracing::error!(game = %game, error = %e, "Field-change watcher subscription failed");
                break;
            }
            None => break,
        }
    }
    tracing::debug!(game = %game, "Field-change watcher stopped");
}

/// Watch `value` on one game.
pub async fn run_snapshot_watcher(pipeline: Pipeline, game: String, mut feed: Feed) {
    let cancel = pipeline.cancel_token();
    let mut tracker = SnapshotTracker::new();
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = feed.recv() => item,
        };
        match item {
            Some(Ok(snapshot)) => {
                let today = pipeline.today();
                if let Some(number) = tracker.observe(&snapshot.value, &today) {
                    tracing::debug!(game = %game, date = %today, number = %number, "Snapshot carries a new number for today");
                    pipeline.notify(&game, &today, &number).await;
                }
            }
            Some(Err(e)) => {
                tracing::error!(game = %game, error = %e, "Snapshot watcher subscription failed");
                break;
            }
            None => break,
        }
    }
    tracing::debug!(game = %game, "Snapshot watcher stopped");
}
