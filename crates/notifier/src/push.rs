//! Web Push delivery (VAPID-signed, `aes128gcm`-encrypted).

use async_trait::async_trait;
use thiserror::Error;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, URL_SAFE_NO_PAD, VapidSignatureBuilder,
    WebPushClient, WebPushError, WebPushMessageBuilder,
};

use numcast_common::config::AppConfig;
use numcast_common::types::PushSubscription;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("Endpoint no longer exists: {0}")]
    EndpointGone(String),

    #[error("Payload too large for push service")]
    PayloadTooLarge,

    #[error("VAPID signing failed: {0}")]
    Vapid(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

impl PushError {
    fn from_web_push(err: WebPushError) -> Self {
        let message = err.to_string();
        match err.short_description() {
            "endpoint_not_valid" | "endpoint_not_found" => PushError::EndpointGone(message),
            "payload_too_large" => PushError::PayloadTooLarge,
            "missing_crypto_keys" | "invalid_crypto_keys" | "invalid_uri" => {
                PushError::InvalidSubscription(message)
            }
            "invalid_claims" | "unauthorized" => PushError::Vapid(message),
            _ => PushError::Delivery(message),
        }
    }
}

/// One delivery attempt to one destination.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &str) -> Result<(), PushError>;
}

/// Delivers through the browsers' push services using the `web-push` client.
pub struct WebPushSender {
    client: IsahcWebPushClient,
    private_key: String,
    subject: String,
    ttl: Option<u32>,
}

impl WebPushSender {
    pub fn new(
        private_key: impl Into<String>,
        subject: impl Into<String>,
        ttl: Option<u32>,
    ) -> Result<Self, PushError> {
        let private_key = private_key.into();
        // Reject an unusable key at startup rather than on the first send.
        VapidSignatureBuilder::from_base64_no_sub(&private_key, URL_SAFE_NO_PAD)
            .map_err(|e| PushError::Vapid(e.to_string()))?;
        let client = IsahcWebPushClient::new().map_err(|e| PushError::Delivery(e.to_string()))?;

        Ok(Self {
            client,
            private_key,
            subject: subject.into(),
            ttl,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PushError> {
        Self::new(
            config.vapid_private_key.clone(),
            config.vapid_subject.clone(),
            config.push_ttl_seconds,
        )
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, subscription: &PushSubscription, payload: &str) -> Result<(), PushError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.as_str(),
            subscription.keys.p256dh.as_str(),
            subscription.keys.auth.as_str(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.private_key, URL_SAFE_NO_PAD, &info)
                .map_err(|e| PushError::Vapid(e.to_string()))?;
        signature.add_claim("sub", self.subject.as_str());
        let signature = signature
            .build()
            .map_err(|e| PushError::Vapid(e.to_string()))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());
        builder.set_vapid_signature(signature);
        if let Some(ttl) = self.ttl {
            builder.set_ttl(ttl);
        }
        let message = builder.build().map_err(PushError::from_web_push)?;

        self.client
            .send(message)
            .await
            .map_err(PushError::from_web_push)
    }
}
