/// Wire frames exchanged with the alert gateway
///
/// Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.
/// Server frames may omit `data`; the payload then takes its empty value.
use crate::models::Alert;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const SERVER_EVENTS: &[&str] = &["connected", "alert", "disconnect", "connect_error", "pong"];

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Handshake accepted; payload is server metadata (socket id, user, role...)
    /// or `Null` when the server sent none
    #[serde(rename = "connected")]
    Connected(Value),

    #[serde(rename = "alert")]
    Alert(Alert),

    /// Server-initiated close; the reason is empty when none was given
    #[serde(rename = "disconnect")]
    Disconnect(String),

    #[serde(rename = "connect_error")]
    ConnectError(ConnectErrorPayload),

    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectErrorPayload {
    #[serde(default)]
    pub message: String,
}

/// Events emitted by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "alert:acknowledge")]
    Acknowledge(AcknowledgePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgePayload {
    pub alert_type: String,
    pub alert_id: String,
    /// RFC 3339 / ISO 8601 instant the acknowledgment was produced
    pub timestamp: String,
}

/// Frame as it comes off the wire, before the payload is interpreted
#[derive(Deserialize)]
struct RawServerFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let RawServerFrame { event, data } = RawServerFrame::deserialize(deserializer)?;

        let decoded = match event.as_str() {
            "connected" => Ok(ServerEvent::Connected(data)),
            "alert" => serde_json::from_value(data).map(ServerEvent::Alert),
            "disconnect" => Ok(ServerEvent::Disconnect(payload_text(data))),
            "connect_error" => match data {
                Value::Null => Ok(ServerEvent::ConnectError(ConnectErrorPayload::default())),
                Value::String(message) => Ok(ServerEvent::ConnectError(ConnectErrorPayload { message })),
                other => serde_json::from_value(other).map(ServerEvent::ConnectError),
            },
            "pong" => Ok(ServerEvent::Pong),
            other => return Err(D::Error::unknown_variant(other, SERVER_EVENTS)),
        };

        decoded.map_err(D::Error::custom)
    }
}

/// Text payloads may arrive bare, as null, or as some other JSON value
fn payload_text(data: Value) -> String {
    match data {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

impl ServerEvent {
    /// Wire name of the event, used for logging
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::Alert(_) => "alert",
            ServerEvent::Disconnect(_) => "disconnect",
            ServerEvent::ConnectError(_) => "connect_error",
            ServerEvent::Pong => "pong",
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    pub fn acknowledge(
        alert_type: impl Into<String>,
        alert_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        ClientEvent::Acknowledge(AcknowledgePayload {
            alert_type: alert_type.into(),
            alert_id: alert_id.into(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Ping => "ping",
            ClientEvent::Acknowledge(_) => "alert:acknowledge",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
