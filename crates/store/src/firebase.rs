//! Firebase Realtime Database client over REST and Server-Sent Events.
//!
//! Point reads are plain `GET {db}/{path}.json`. Feeds hold a streaming
//! request open (`Accept: text/event-stream`) and feed each `put`/`patch`
//! into a [`Mirror`], which turns raw writes into child/value snapshots.
//! A dropped connection is re-established with capped exponential backoff;
//! the mirror survives so the server's replay only surfaces real differences.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;

use numcast_common::config::AppConfig;

use crate::credentials::{ServiceAccount, TokenProvider};
use crate::error::StoreError;
use crate::feed::{self, Feed, FeedKind, FeedSender};
use crate::mirror::{Mirror, WriteOp, last_segment};
use crate::sse::{SseEvent, SseParser};
use crate::DataStore;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Payload of `put` and `patch` stream events.
#[derive(Debug, PartialEq, Deserialize)]
struct StreamMessage {
    path: String,
    data: Value,
}

/// What a feed does with one stream event.
#[derive(Debug)]
enum StreamAction {
    Apply(WriteOp, StreamMessage),
    Skip,
    Malformed(serde_json::Error),
    Cancel(String),
    AuthRevoked,
}

fn classify(event: SseEvent) -> StreamAction {
    let op = match event.event.as_str() {
        "put" => WriteOp::Put,
        "patch" => WriteOp::Patch,
        "cancel" => return StreamAction::Cancel(event.data),
        "auth_revoked" => return StreamAction::AuthRevoked,
        // keep-alive and anything unknown
        _ => return StreamAction::Skip,
    };
    match serde_json::from_str(&event.data) {
        Ok(message) => StreamAction::Apply(op, message),
        Err(e) => StreamAction::Malformed(e),
    }
}

/// Reconnect delay: doubles per failed attempt, capped, reset on connect.
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    fn current(&self) -> Duration {
        self.current
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }

    fn grow(&mut self) {
        self.current = (self.current * 2).min(MAX_BACKOFF);
    }
}

/// Why a single streaming connection ended without a terminal error.
enum StreamEnd {
    /// The feed receiver was dropped.
    ReceiverGone,
    /// The server closed the stream.
    Disconnected,
    /// The server revoked our credentials; reconnect with a fresh token.
    AuthRevoked,
}

#[derive(Clone)]
pub struct FirebaseStore {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenProvider>,
}

impl FirebaseStore {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, tokens: TokenProvider) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: Arc::new(tokens),
        }
    }

    /// Build a client from application config, loading the service account.
    pub async fn connect(config: &AppConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("numcast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let account = ServiceAccount::load(&config.service_account).await?;
        let tokens = TokenProvider::new(http.clone(), account)?;

        // Fail fast on bad credentials instead of on the first subscription.
        tokens.access_token().await?;
        tracing::info!(
            database_url = %config.database_url,
            client_email = %tokens.client_email(),
            "Connected to Realtime Database"
        );

        Ok(Self::new(http, config.database_url.clone(), tokens))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized {
                status: status.as_u16(),
                body,
            },
            _ => StoreError::Http {
                status: status.as_u16(),
                body,
            },
        })
    }

    /// Keep a feed alive until it fails terminally or its receiver goes away.
    async fn run_feed(self, path: String, kind: FeedKind, tx: FeedSender) {
        let mut mirror = Mirror::new(kind, last_segment(&path));
        let mut backoff = Backoff::new();

        loop {
            match self.stream_once(&path, &mut mirror, &tx, &mut backoff).await {
                Ok(StreamEnd::ReceiverGone) => {
                    tracing::debug!(path = %path, kind = %kind, "Feed dropped, closing stream");
                    return;
                }
                Ok(StreamEnd::AuthRevoked) => {
                    tracing::info!(path = %path, kind = %kind, "Access token revoked, reconnecting");
                    self.tokens.invalidate().await;
                    continue;
                }
                Ok(StreamEnd::Disconnected) => {
                    tracing::warn!(
                        path = %path,
                        kind = %kind,
                        retry_in_ms = backoff.current().as_millis() as u64,
                        "Stream closed by server, reconnecting"
                    );
                }
                Err(e) if e.is_terminal() => {
                    let _ = tx.send(Err(e));
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path,
                        kind = %kind,
                        error = %e,
                        retry_in_ms = backoff.current().as_millis() as u64,
                        "Stream error, reconnecting"
                    );
                }
            }

            tokio::select! {
                _ = tx.closed() => return,
                _ = tokio::time::sleep(backoff.current()) => {}
            }
            backoff.grow();
        }
    }

    async fn stream_once(
        &self,
        path: &str,
        mirror: &mut Mirror,
        tx: &FeedSender,
        backoff: &mut Backoff,
    ) -> Result<StreamEnd, StoreError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.url(path))
            .query(&[("access_token", token.as_str())])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        backoff.reset();

        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = tx.closed() => return Ok(StreamEnd::ReceiverGone),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                return Ok(StreamEnd::Disconnected);
            };
            let chunk = chunk?;

            for event in parser.push(&chunk) {
                let kind = event.event.clone();
                let (op, message) = match classify(event) {
                    StreamAction::Apply(op, message) => (op, message),
                    StreamAction::Skip => {
                        if kind != "keep-alive" {
                            tracing::debug!(path = %path, event = %kind, "Ignoring unknown stream event");
                        }
                        continue;
                    }
                    StreamAction::Malformed(e) => {
                        tracing::warn!(path = %path, event = %kind, error = %e, "Skipping malformed stream event");
                        continue;
                    }
                    StreamAction::Cancel(reason) => return Err(StoreError::Cancelled(reason)),
                    StreamAction::AuthRevoked => return Ok(StreamEnd::AuthRevoked),
                };

                for snapshot in mirror.apply(op, &message.path, message.data) {
                    if tx.send(Ok(snapshot)).is_err() {
                        return Ok(StreamEnd::ReceiverGone);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl DataStore for FirebaseStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.url(path))
            .query(&[("access_token", token.as_str())])
            .send()
            .await?;
        let value: Value = Self::check_status(response).await?.json().await?;
        Ok((!value.is_null()).then_some(value))
    }

    fn subscribe(&self, path: &str, kind: FeedKind) -> Feed {
        let (tx, rx) = feed::channel();
        tokio::spawn(self.clone().run_feed(path.trim_matches('/').to_string(), kind, tx));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, data: &str) -> SseEvent {
        SseEvent {
            event: name.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_put_and_patch_are_applied() {
        match classify(event("put", r#"{"path":"/","data":{"2026-10-14":{"number":"45"}}}"#)) {
            StreamAction::Apply(WriteOp::Put, message) => {
                assert_eq!(message.path, "/");
                assert_eq!(message.data, json!({"2026-10-14": {"number": "45"}}));
            }
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(matches!(
            classify(event("patch", r#"{"path":"/2026-10-14","data":{"number":null}}"#)),
            StreamAction::Apply(WriteOp::Patch, _)
        ));
    }

    #[test]
    fn test_keep_alive_and_unknown_events_are_skipped() {
        assert!(matches!(classify(event("keep-alive", "null")), StreamAction::Skip));
        assert!(matches!(classify(event("rules_debug", "{}")), StreamAction::Skip));
    }

    #[test]
    fn test_malformed_payload_is_reported_not_applied() {
        assert!(matches!(
            classify(event("put", "not json")),
            StreamAction::Malformed(_)
        ));
        assert!(matches!(
            classify(event("patch", r#"{"data":1}"#)),
            StreamAction::Malformed(_)
        ));
    }

    #[test]
    fn test_cancel_and_auth_revoked() {
        match classify(event("cancel", "Permission denied")) {
            StreamAction::Cancel(reason) => assert_eq!(reason, "Permission denied"),
            other => panic!("unexpected action: {:?}", other),
        }
        assert!(matches!(
            classify(event("auth_revoked", "credential is no longer valid")),
            StreamAction::AuthRevoked
        ));
        // A cancel surfaces as a terminal feed error.
        assert!(StoreError::Cancelled("Permission denied".into()).is_terminal());
    }

    #[test]
    fn test_backoff_doubles_caps_and_resets() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.current(), Duration::from_millis(500));
        backoff.grow();
        assert_eq!(backoff.current(), Duration::from_secs(1));
        for _ in 0..10 {
            backoff.grow();
        }
        assert_eq!(backoff.current(), MAX_BACKOFF);
        backoff.reset();
        assert_eq!(backoff.current(), INITIAL_BACKOFF);
    }
}
