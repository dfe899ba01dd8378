//! Session credential lookup.
//!
//! The alert stream reads the bearer token once at start-up and never watches it afterwards.

use crate::error::{AlertError, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

pub trait SessionStore: Send + Sync {
    /// Current bearer token, `None` when the user is not signed in
    fn token(&self) -> Option<String>;
}

/// Token known up front (env var, CLI, tests)
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    token: Option<String>,
}

impl StaticSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

impl SessionStore for StaticSession {
    fn token(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.is_empty())
    }
}

/// Persisted auth state on disk.
///
/// Accepts either `{"token": "..."}` or the nested `{"state": {"token": "..."}}` layout.
#[derive(Debug, Clone)]
pub struct FileSession {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedSession {
    Nested { state: TokenHolder },
    Flat(TokenHolder),
}

#[derive(Deserialize)]
struct TokenHolder {
    #[serde(default)]
    token: Option<String>,
}

impl FileSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<String>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AlertError::Session(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let persisted: PersistedSession = serde_json::from_str(&raw)
            .map_err(|e| AlertError::Session(format!("{}: {}", self.path.display(), e)))?;

        let holder = match persisted {
            PersistedSession::Nested { state } => state,
            PersistedSession::Flat(holder) => holder,
        };

        Ok(holder.token.filter(|t| !t.is_empty()))
    }
}

impl SessionStore for FileSession {
    fn token(&self) -> Option<String> {
        match self.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Unreadable session file, treating as signed out");
                None
            }
        }
    }
}
