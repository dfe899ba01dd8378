use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Alert severity. Only drives presentation, never delivery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Urgent,
    Warning,
    Success,
    #[default]
    Info,
    /// Any severity this client does not know about
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Urgent => "urgent",
            Severity::Warning => "warning",
            Severity::Success => "success",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compliance or safety event pushed by the server.
///
/// Fields are taken as-is from the producer: missing or null strings decode
/// as empty, a missing or null severity decodes as `Info` and a severity that
/// is not a known name decodes as `Unknown`. Type-specific fields (animal id,
/// drug, residue level, ...) are kept verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub alert_type: String,
    #[serde(default, deserialize_with = "lenient_severity")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Alert {
    pub fn new(
        alert_type: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type: alert_type.into(),
            severity,
            title: title.into(),
            message: message.into(),
            payload: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Null becomes empty; numbers and other scalars keep their JSON text
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

fn lenient_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Severity::default(),
        Some(name @ Value::String(_)) => {
            serde_json::from_value(name).unwrap_or(Severity::Unknown)
        }
        Some(_) => Severity::Unknown,
    })
}

/// Client-side wrapper around a received alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: String,
    pub alert: Alert,
    pub read: bool,
    pub received_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(id: String, alert: Alert, received_at: DateTime<Utc>) -> Self {
        Self {
            id,
            alert,
            read: false,
            received_at,
        }
    }

    /// Base id for an alert arriving at `received_at`: `{type}_{unix_millis}`
    pub fn base_id(alert: &Alert, received_at: DateTime<Utc>) -> String {
        format!("{}_{}", alert.alert_type, received_at.timestamp_millis())
    }
}

/// Transport connection state shared with every listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_decodes_with_payload_fields() {
        let alert: Alert = serde_json::from_value(json!({
            "type": "MRL_VIOLATION",
            "severity": "critical",
            "title": "Residue above limit",
            "message": "Oxytetracycline in batch 42",
            "animalId": "TAG-0042",
            "level": 312.5
        }))
        .unwrap();

        assert_eq!(alert.alert_type, "MRL_VIOLATION");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.payload.get("animalId"), Some(&json!("TAG-0042")));
        assert_eq!(alert.payload.len(), 2);
    }

    #[test]
    fn test_unknown_severity_decodes_as_unknown() {
        let alert: Alert =
            serde_json::from_value(json!({"type": "OUTBREAK", "severity": "catastrophic"}))
                .unwrap();
        assert_eq!(alert.severity, Severity::Unknown);
    }

    #[test]
    fn test_missing_fields_pass_through_as_defaults() {
        let alert: Alert = serde_json::from_value(json!({})).unwrap();
        assert_eq!(alert.alert_type, "");
        assert_eq!(alert.title, "");
        assert_eq!(alert.severity, Severity::Info);
    }

    #[test]
    fn test_null_fields_pass_through_as_defaults() {
        let alert: Alert = serde_json::from_value(json!({
            "type": null,
            "severity": null,
            "title": null,
            "message": null,
            "animalId": "TAG-0042"
        }))
        .unwrap();

        assert_eq!(alert.alert_type, "");
        assert_eq!(alert.severity, Severity::Info);
        assert_eq!(alert.title, "");
        assert_eq!(alert.message, "");
        assert_eq!(alert.payload.get("animalId"), Some(&json!("TAG-0042")));
    }

    #[test]
    fn test_wrong_typed_fields_still_decode() {
        let alert: Alert = serde_json::from_value(json!({
            "type": "WITHDRAWAL_BREACH",
            "severity": 3,
            "title": 42,
            "message": true
        }))
        .unwrap();

        assert_eq!(alert.severity, Severity::Unknown);
        assert_eq!(alert.title, "42");
        assert_eq!(alert.message, "true");
    }

    #[test]
    fn test_notification_base_id() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let alert = Alert::new("WITHDRAWAL_BREACH", Severity::Urgent, "t", "m");
        assert_eq!(
            Notification::base_id(&alert, at),
            "WITHDRAWAL_BREACH_1700000000123"
        );
    }
}
