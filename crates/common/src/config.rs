use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

/// Length of an uncompressed P-256 public key (0x04 || X || Y).
const VAPID_PUBLIC_KEY_LEN: usize = 65;

/// Length of a raw P-256 private scalar.
const VAPID_PRIVATE_KEY_LEN: usize = 32;

/// Where the Google service account used for database access comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAccountSource {
    /// Path to a service account JSON key file.
    File(PathBuf),
    /// The service account JSON itself, passed inline.
    Inline(String),
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Realtime Database root URL, e.g. `https://my-app-default-rtdb.firebaseio.com`
    pub database_url: String,

    /// Service account credentials used to mint database access tokens
    pub service_account: ServiceAccountSource,

    /// VAPID public key (base64url, uncompressed P-256 point)
    pub vapid_public_key: String,

    /// VAPID private key (base64url, raw 32-byte scalar)
    pub vapid_private_key: String,

    /// VAPID `sub` claim, a `mailto:` or `https:` contact URI
    pub vapid_subject: String,

    /// Database node whose children are the tracked games
    pub tracked_root: String,

    /// Database node holding registered push subscriptions
    pub subscriptions_path: String,

    /// Window within which an identical (game, date, number) is not re-sent
    pub dedup_window_ms: u64,

    /// TTL attached to each push message; push service default when unset
    pub push_ttl_seconds: Option<u32>,

    /// HTTP listen port (default: 3000)
    pub port: u16,

    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
        };

        let database_url = require("FIREBASE_DATABASE_URL")?
            .trim_end_matches('/')
            .to_string();
        if !database_url.starts_with("https://") && !database_url.starts_with("http://") {
            anyhow::bail!("FIREBASE_DATABASE_URL must be an http(s) URL");
        }

        let service_account = match (
            lookup("GOOGLE_APPLICATION_CREDENTIALS").filter(|v| !v.trim().is_empty()),
            lookup("FIREBASE_SERVICE_ACCOUNT").filter(|v| !v.trim().is_empty()),
        ) {
            (_, Some(json)) => ServiceAccountSource::Inline(json),
            (Some(path), None) => ServiceAccountSource::File(PathBuf::from(path)),
            (None, None) => anyhow::bail!(
                "either GOOGLE_APPLICATION_CREDENTIALS or FIREBASE_SERVICE_ACCOUNT is required"
            ),
        };

        let vapid_public_key = require("VAPID_PUBLIC_KEY")?;
        validate_vapid_key("VAPID_PUBLIC_KEY", &vapid_public_key, VAPID_PUBLIC_KEY_LEN)?;
        let vapid_private_key = require("VAPID_PRIVATE_KEY")?;
        validate_vapid_key("VAPID_PRIVATE_KEY", &vapid_private_key, VAPID_PRIVATE_KEY_LEN)?;

        let log_format = match lookup("LOG_FORMAT") {
            Some(v) => serde_json::from_value(serde_json::Value::String(v.to_lowercase()))
                .map_err(|_| anyhow::anyhow!("LOG_FORMAT must be `pretty` or `json`"))?,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            database_url,
            service_account,
            vapid_public_key,
            vapid_private_key,
            vapid_subject: lookup("VAPID_SUBJECT")
                .unwrap_or_else(|| "mailto:admin@example.com".to_string()),
            tracked_root: lookup("TRACKED_ROOT")
                .map(|v| v.trim_matches('/').to_string())
                .unwrap_or_else(|| "games".to_string()),
            subscriptions_path: lookup("SUBSCRIPTIONS_PATH")
                .map(|v| v.trim_matches('/').to_string())
                .unwrap_or_else(|| "subscriptions".to_string()),
            dedup_window_ms: lookup("DEDUP_WINDOW_MS")
                .unwrap_or_else(|| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEDUP_WINDOW_MS must be a valid u64"))?,
            push_ttl_seconds: lookup("PUSH_TTL_SECONDS")
                .map(|v| {
                    v.parse()
                        .map_err(|_| anyhow::anyhow!("PUSH_TTL_SECONDS must be a valid u32"))
                })
                .transpose()?,
            port: lookup("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid u16"))?,
            log_format,
        })
    }
}

fn validate_vapid_key(name: &str, key: &str, expected_len: usize) -> anyhow::Result<()> {
    let bytes = URL_SAFE_NO_PAD
        .decode(key.trim().trim_end_matches('='))
        .map_err(|e| anyhow::anyhow!("{name} is not valid base64url: {e}"))?;
    if bytes.len() != expected_len {
        anyhow::bail!(
            "{name} must decode to {expected_len} bytes, got {}",
            bytes.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("FIREBASE_DATABASE_URL", "https://demo-rtdb.firebaseio.com/".to_string()),
            ("GOOGLE_APPLICATION_CREDENTIALS", "/etc/numcast/sa.json".to_string()),
            ("VAPID_PUBLIC_KEY", URL_SAFE_NO_PAD.encode([4u8; 65])),
            ("VAPID_PRIVATE_KEY", URL_SAFE_NO_PAD.encode([7u8; 32])),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> anyhow::Result<AppConfig> {
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.database_url, "https://demo-rtdb.firebaseio.com");
        assert_eq!(
            config.service_account,
            ServiceAccountSource::File(PathBuf::from("/etc/numcast/sa.json"))
        );
        assert_eq!(config.tracked_root, "games");
        assert_eq!(config.subscriptions_path, "subscriptions");
        assert_eq!(config.dedup_window_ms, 5000);
        assert_eq!(config.push_ttl_seconds, None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_inline_service_account_wins() {
        let mut env = base_env();
        env.insert("FIREBASE_SERVICE_ACCOUNT", "{\"client_email\":\"x\"}".to_string());
        let config = load(&env).unwrap();
        assert!(matches!(config.service_account, ServiceAccountSource::Inline(_)));
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        let mut env = base_env();
        env.remove("GOOGLE_APPLICATION_CREDENTIALS");
        assert!(load(&env).is_err());
    }

    #[test]
    fn test_missing_vapid_key_is_fatal() {
        let mut env = base_env();
        env.remove("VAPID_PRIVATE_KEY");
        let err = load(&env).unwrap_err().to_string();
        assert!(err.contains("VAPID_PRIVATE_KEY"));
    }

    #[test]
    fn test_malformed_vapid_key_is_fatal() {
        let mut env = base_env();
        env.insert("VAPID_PUBLIC_KEY", URL_SAFE_NO_PAD.encode([4u8; 33]));
        assert!(load(&env).is_err());

        env.insert("VAPID_PUBLIC_KEY", "not base64 !!".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut env = base_env();
        env.insert("TRACKED_ROOT", "/results/".to_string());
        env.insert("DEDUP_WINDOW_MS", "250".to_string());
        env.insert("PUSH_TTL_SECONDS", "3600".to_string());
        env.insert("PORT", "8080".to_string());
        env.insert("LOG_FORMAT", "JSON".to_string());
        let config = load(&env).unwrap();
        assert_eq!(config.tracked_root, "results");
        assert_eq!(config.dedup_window_ms, 250);
        assert_eq!(config.push_ttl_seconds, Some(3600));
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut env = base_env();
        env.insert("DEDUP_WINDOW_MS", "soon".to_string());
        assert!(load(&env).is_err());
    }
}
