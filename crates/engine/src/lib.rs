//! Change detection and notification pipeline.
//!
//! Discovery attaches two watchers to every game under the tracked root: a
//! field-change watcher on `child_changed` and a snapshot watcher on `value`.
//! Both funnel today's number through one [`dedup::DedupCache`] before the
//! dispatcher fans it out, so whichever feed sees a write first wins and the
//! other is suppressed.

pub mod clock;
pub mod context;
pub mod dedup;
pub mod discovery;
pub mod watcher;
