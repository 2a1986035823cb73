//! Service-account access tokens for the Realtime Database.
//!
//! Signs an RS256 JWT assertion with the service account key and exchanges it
//! at the account's token endpoint (OAuth2 JWT bearer grant). Tokens are
//! cached until shortly before they expire.

use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use numcast_common::config::ServiceAccountSource;

use crate::error::StoreError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const DATABASE_SCOPES: &str =
    "https://www.googleapis.com/auth/firebase.database https://www.googleapis.com/auth/userinfo.email";

/// Lifetime requested for each assertion (Google's maximum).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service account key file that token minting needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccount {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Credentials(format!("invalid service account JSON: {}", e)))
    }

    pub async fn load(source: &ServiceAccountSource) -> Result<Self, StoreError> {
        match source {
            ServiceAccountSource::Inline(json) => Self::from_json(json),
            ServiceAccountSource::File(path) => {
                let json = tokio::fs::read_to_string(path).await.map_err(|e| {
                    StoreError::Credentials(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_json(&json)
            }
        }
    }

    fn claims(&self, issued_at: i64) -> AssertionClaims {
        AssertionClaims {
            iss: self.client_email.clone(),
            scope: DATABASE_SCOPES.to_string(),
            aud: self.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Mints and caches OAuth2 access tokens for a service account.
pub struct TokenProvider {
    http: reqwest::Client,
    account: ServiceAccount,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, account: ServiceAccount) -> Result<Self, StoreError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
        Ok(Self {
            http,
            account,
            key,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.account.client_email
    }

    /// A valid access token, minting a fresh one when the cache is stale.
    pub async fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }

        let assertion = encode(
            &Header::new(Algorithm::RS256),
            &self.account.claims(Utc::now().timestamp()),
            &self.key,
        )?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                StoreError::Http {
                    status: status.as_u16(),
                    body,
                }
            } else {
                StoreError::Credentials(format!("token exchange rejected ({}): {}", status, body))
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(REFRESH_MARGIN);

        tracing::debug!(
            client_email = %self.account.client_email,
            expires_in = token.expires_in,
            "Minted database access token"
        );

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// Drop the cached token, e.g. after the server revoked it.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
