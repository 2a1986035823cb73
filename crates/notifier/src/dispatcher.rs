//! Notification dispatcher.
//!
//! Every dispatch does one snapshot read of the subscriber node, collapses
//! subscriptions sharing an endpoint (last one wins), and attempts one
//! delivery per unique endpoint. A failed delivery is logged and counted; it
//! never aborts the remaining deliveries.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use numcast_common::error::AppError;
use numcast_common::types::{NotificationPayload, PushSubscription};
use numcast_store::{DataStore, StoreError};

use crate::push::PushSender;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to read subscribers: {0}")]
    Store(#[from] StoreError),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::Store(err.to_string())
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Unique endpoints a delivery was attempted to.
    pub targeted: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    store: Arc<dyn DataStore>,
    sender: Arc<dyn PushSender>,
    subscriptions_path: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DataStore>,
        sender: Arc<dyn PushSender>,
        subscriptions_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sender,
            subscriptions_path: subscriptions_path.into(),
        }
    }

    /// Current subscribers, one per distinct endpoint.
    pub async fn unique_subscribers(&self) -> Result<Vec<PushSubscription>, DispatchError> {
        let value = self.store.read(&self.subscriptions_path).await?;
        Ok(value
            .map(|v| dedupe_by_endpoint(parse_subscriptions(&v)))
            .unwrap_or_default())
    }

    /// Tell every subscriber about today's number for `game`.
    pub async fn send_number_notification(
        &self,
        game: &str,
        date: &str,
        number: &str,
    ) -> Result<DispatchReport, DispatchError> {
        let dispatch_id = Uuid::new_v4();
        let subscribers = self.unique_subscribers().await?;
        if subscribers.is_empty() {
            tracing::info!(%dispatch_id, game, date, number, "No subscribers, nothing to send");
            return Ok(DispatchReport::default());
        }

        let payload = NotificationPayload::number_updated(game, number);
        let report = self.deliver(dispatch_id, &subscribers, &payload).await;

        tracing::info!(
            %dispatch_id,
            game,
            date,
            number,
            unique_endpoints = report.targeted,
            sent = report.sent,
            failed = report.failed,
            "Number notification dispatched"
        );
        Ok(report)
    }

    /// Send the fixed test payload to every subscriber.
    pub async fn send_test_notification(&self) -> Result<DispatchReport, DispatchError> {
        let dispatch_id = Uuid::new_v4();
        let subscribers = self.unique_subscribers().await?;
        if subscribers.is_empty() {
            return Ok(DispatchReport::default());
        }

        let report = self
            .deliver(dispatch_id, &subscribers, &NotificationPayload::test())
            .await;

        tracing::info!(
            %dispatch_id,
            unique_endpoints = report.targeted,
            sent = report.sent,
            failed = report.failed,
            "Test notification dispatched"
        );
        Ok(report)
    }

    async fn deliver(
        &self,
        dispatch_id: Uuid,
        subscribers: &[PushSubscription],
        payload: &NotificationPayload,
    ) -> DispatchReport {
        let text = payload.to_text();

        let outcomes = join_all(subscribers.iter().map(|subscription| {
            let text = text.as_str();
            async move {
                match self.sender.send(subscription, text).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(%dispatch_id, error = %e, "Push delivery failed");
                        false
                    }
                }
            }
        }))
        .await;

        let sent = outcomes.iter().filter(|ok| **ok).count();
        DispatchReport {
            targeted: subscribers.len(),
            sent,
            failed: subscribers.len() - sent,
        }
    }
}

/// Decode the subscriber node, which may be a keyed object or an array.
/// Entries that are not valid subscriptions are skipped.
pub fn parse_subscriptions(value: &Value) -> Vec<PushSubscription> {
    let entries: Vec<&Value> = match value {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter(|entry| !entry.is_null())
        .filter_map(|entry| match serde_json::from_value::<PushSubscription>(entry.clone()) {
            Ok(sub) if !sub.endpoint.is_empty() => Some(sub),
            Ok(_) => {
                tracing::warn!("Skipping subscription with empty endpoint");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed subscription");
                None
            }
        })
        .collect()
}

/// Keep one subscription per endpoint; later entries replace earlier ones.
pub fn dedupe_by_endpoint(subscriptions: Vec<PushSubscription>) -> Vec<PushSubscription> {
    let mut by_endpoint: BTreeMap<String, PushSubscription> = BTreeMap::new();
    for subscription in subscriptions {
        by_endpoint.insert(subscription.endpoint.clone(), subscription);
    }
    by_endpoint.into_values().collect()
}
