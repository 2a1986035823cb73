//! Game discovery.
//!
//! Attaches watchers to every game present at startup (one point read of the
//! tracked root) and to every game added afterwards (`child_added` on the
//! root). The `child_added` feed also replays existing games on first load,
//! so attachment is idempotent per game name.

use serde_json::Value;

use numcast_store::FeedKind;

use crate::context::Pipeline;
use crate::watcher::{run_field_change_watcher, run_snapshot_watcher};

pub async fn run_discovery(pipeline: Pipeline) {
    let root = pipeline.tracked_root().to_string();
    let cancel = pipeline.cancel_token();

    // Subscribe before the read so games created in between are not missed.
    let mut added = pipeline.store().subscribe(&root, FeedKind::ChildAdded);

    match pipeline.store().read(&root).await {
        Ok(Some(Value::Object(games))) => {
            tracing::info!(count = games.len(), "Found existing games");
            for game in games.keys() {
                attach(&pipeline, game).await;
            }
        }
        Ok(_) => tracing::info!(tracked_root = %root, "No games yet"),
        Err(e) => {
            tracing::error!(tracked_root = %root, error = %e, "Failed to enumerate existing games");
        }
    }

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            item = added.recv() => item,
        };
        match item {
            Some(Ok(snapshot)) => {
                attach(&pipeline, &snapshot.key).await;
            }
            Some(Err(e)) => {
                tracing::error!(tracked_root = %root, error = %e, "Game discovery subscription failed");
                break;
            }
            None => break,
        }
    }
}

/// Attach both watchers to `game` unless it is already watched.
pub async fn attach(pipeline: &Pipeline, game: &str) -> bool {
    if !pipeline.mark_attached(game).await {
        tracing::debug!(game, "Already watching game");
        return false;
    }

    let path = pipeline.game_path(game);
    let changes = pipeline.store().subscribe(&path, FeedKind::ChildChanged);
    let snapshots = pipeline.store().subscribe(&path, FeedKind::Value);

    pipeline.spawn(run_field_change_watcher(
        pipeline.clone(),
        game.to_string(),
        changes,
    ));
    pipeline.spawn(run_snapshot_watcher(
        pipeline.clone(),
        game.to_string(),
        snapshots,
    ));

    tracing::info!(game, path = %path, "Watching game");
    true
}
