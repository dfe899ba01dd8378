use crate::error::{AlertError, Result};
use crate::session::{FileSession, SessionStore, StaticSession};
use crate::store::StoreOptions;
use crate::websocket::ConnectionOptions;
use resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub reconnect: ReconnectConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// ws:// or wss:// endpoint of the alert gateway
    pub url: String,
    pub heartbeat_secs: u64,
    /// Time allowed between opening the transport and the server's `connected`
    pub handshake_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive connection errors before giving up
    pub max_attempts: u32,
    pub jitter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub history_limit: usize,
    pub start_debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Explicit token, wins over the session file
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub session_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            gateway: GatewayConfig {
                url: lookup("ALERTS_WS_URL")
                    .unwrap_or_else(|| "ws://localhost:3000/ws/alerts".to_string()),
                heartbeat_secs: parse_or(&lookup, "ALERTS_HEARTBEAT_SECS", 30)?,
                handshake_timeout_secs: parse_or(&lookup, "ALERTS_HANDSHAKE_TIMEOUT_SECS", 20)?,
            },
            reconnect: ReconnectConfig {
                initial_delay_ms: parse_or(&lookup, "ALERTS_RECONNECT_INITIAL_MS", 1000)?,
                max_delay_ms: parse_or(&lookup, "ALERTS_RECONNECT_MAX_MS", 5000)?,
                max_attempts: parse_or(&lookup, "ALERTS_RECONNECT_ATTEMPTS", 5)?,
                jitter: parse_or(&lookup, "ALERTS_RECONNECT_JITTER", true)?,
            },
            store: StoreConfig {
                history_limit: parse_or(&lookup, "ALERTS_HISTORY_LIMIT", 50)?,
                start_debounce_ms: parse_or(&lookup, "ALERTS_START_DEBOUNCE_MS", 100)?,
            },
            session: SessionConfig {
                token: lookup("ALERTS_TOKEN").filter(|t| !t.is_empty()),
                session_file: lookup("ALERTS_SESSION_FILE").map(PathBuf::from),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.gateway.url.starts_with("ws://") || self.gateway.url.starts_with("wss://")) {
            return Err(AlertError::Config(format!(
                "ALERTS_WS_URL must be a ws:// or wss:// URL, got {}",
                self.gateway.url
            )));
        }
        if self.gateway.heartbeat_secs == 0 {
            return Err(AlertError::Config(
                "ALERTS_HEARTBEAT_SECS must be positive".to_string(),
            ));
        }
        if self.gateway.handshake_timeout_secs == 0 {
            return Err(AlertError::Config(
                "ALERTS_HANDSHAKE_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(AlertError::Config(
                "ALERTS_RECONNECT_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(AlertError::Config(
                "ALERTS_RECONNECT_INITIAL_MS exceeds ALERTS_RECONNECT_MAX_MS".to_string(),
            ));
        }
        if self.store.history_limit == 0 {
            return Err(AlertError::Config(
                "ALERTS_HISTORY_LIMIT must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            heartbeat_interval: Duration::from_secs(self.gateway.heartbeat_secs),
            handshake_timeout: Duration::from_secs(self.gateway.handshake_timeout_secs),
            retry: RetryConfig {
                max_retries: self.reconnect.max_attempts,
                initial_backoff: Duration::from_millis(self.reconnect.initial_delay_ms),
                max_backoff: Duration::from_millis(self.reconnect.max_delay_ms),
                jitter: self.reconnect.jitter,
                ..Default::default()
            },
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            history_limit: self.store.history_limit,
            start_debounce: Duration::from_millis(self.store.start_debounce_ms),
        }
    }

    /// Where the start-up token comes from: `ALERTS_TOKEN`, else the session file
    pub fn session_store(&self) -> Box<dyn SessionStore> {
        match (&self.session.token, &self.session.session_file) {
            (Some(token), _) => Box::new(StaticSession::new(token.clone())),
            (None, Some(path)) => Box::new(FileSession::new(path.clone())),
            (None, None) => Box::new(StaticSession::anonymous()),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AlertError::Config(format!("{}: {}", key, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        let connection = config.connection_options();
        assert_eq!(connection.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(connection.handshake_timeout, Duration::from_secs(20));
        assert_eq!(connection.retry.max_retries, 5);
        assert_eq!(connection.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(connection.retry.max_backoff, Duration::from_secs(5));

        let store = config.store_options();
        assert_eq!(store.history_limit, 50);
        assert_eq!(store.start_debounce, Duration::from_millis(100));
        assert!(config.session_store().token().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ALERTS_WS_URL", "wss://alerts.example.org/ws"),
            ("ALERTS_HISTORY_LIMIT", "20"),
            ("ALERTS_RECONNECT_JITTER", "false"),
            ("ALERTS_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.gateway.url, "wss://alerts.example.org/ws");
        assert_eq!(config.store.history_limit, 20);
        assert!(!config.reconnect.jitter);
        assert_eq!(config.session_store().token().as_deref(), Some("secret"));
    }

    #[test]
    fn test_rejects_http_url() {
        let result = Config::from_lookup(lookup(&[("ALERTS_WS_URL", "http://localhost")]));
        assert!(matches!(result, Err(AlertError::Config(_))));
    }

    #[test]
    fn test_rejects_unparsable_number() {
        let result = Config::from_lookup(lookup(&[("ALERTS_HEARTBEAT_SECS", "soon")]));
        match result {
            Err(AlertError::Config(msg)) => assert!(msg.contains("ALERTS_HEARTBEAT_SECS")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_rejects_zero_handshake_timeout() {
        let result = Config::from_lookup(lookup(&[("ALERTS_HANDSHAKE_TIMEOUT_SECS", "0")]));
        assert!(matches!(result, Err(AlertError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_history() {
        let result = Config::from_lookup(lookup(&[("ALERTS_HISTORY_LIMIT", "0")]));
        assert!(result.is_err());
    }
}
