use serde::{Deserialize, Serialize};

/// Date key format for per-game records (`YYYY-MM-DD`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A number as written by the publishing side: either a JSON string or a JSON number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberValue {
    Text(String),
    Numeric(serde_json::Number),
}

impl NumberValue {
    /// Normalised string form, `None` when the value is blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            NumberValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            NumberValue::Numeric(n) => Some(n.to_string()),
        }
    }
}

/// The payload stored under `<game>/<date>`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueRecord {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub number: Option<NumberValue>,
}

impl ValueRecord {
    /// Lenient decode: anything that is not a record object yields `None`.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// The record's number as a non-empty string.
    pub fn number_text(&self) -> Option<String> {
        self.number.as_ref().and_then(NumberValue::as_text)
    }
}

/// Browser-issued encryption material for a push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One registered push destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

/// Notification content shown by the service worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

impl NotificationPayload {
    pub fn number_updated(game: &str, number: &str) -> Self {
        Self {
            title: "Number Updated!".to_string(),
            body: format!("{} का आज का नंबर: {}", game, number),
        }
    }

    pub fn test() -> Self {
        Self {
            title: "Test Notification".to_string(),
            body: "This is a test push notification.".to_string(),
        }
    }

    /// Serialised JSON text handed to the push encryptor.
    pub fn to_text(&self) -> String {
        serde_json::json!({ "title": self.title, "body": self.body }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_text_accepts_strings_and_numbers() {
        let text = ValueRecord::from_value(&json!({"date": "2026-10-14", "number": "45"})).unwrap();
        assert_eq!(text.number_text().as_deref(), Some("45"));

        let numeric = ValueRecord::from_value(&json!({"number": 7})).unwrap();
        assert_eq!(numeric.number_text().as_deref(), Some("7"));
    }

    #[test]
    fn test_blank_number_is_absent() {
        let blank = ValueRecord::from_value(&json!({"number": "  "})).unwrap();
        assert_eq!(blank.number_text(), None);

        let missing = ValueRecord::from_value(&json!({"date": "2026-10-14"})).unwrap();
        assert_eq!(missing.number_text(), None);
    }

    #[test]
    fn test_non_object_is_not_a_record() {
        assert!(ValueRecord::from_value(&json!("45")).is_none());
        assert!(ValueRecord::from_value(&json!(null)).is_none());
        assert!(ValueRecord::from_value(&json!({"number": true})).is_none());
    }

    #[test]
    fn test_number_updated_payload() {
        let payload = NotificationPayload::number_updated("kalyan", "45");
        assert_eq!(payload.title, "Number Updated!");
        assert_eq!(payload.body, "kalyan का आज का नंबर: 45");

        let text: serde_json::Value = serde_json::from_str(&payload.to_text()).unwrap();
        assert_eq!(text, json!({"title": "Number Updated!", "body": "kalyan का आज का नंबर: 45"}));
    }
}
