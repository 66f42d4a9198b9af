//! Backend connection trait and connection parameters

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A live session with a database backend.
///
/// The pool only needs enough of the session to manage its lifecycle:
/// a cheap round-trip to prove it is alive, and a way to tear it down.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the backend name (e.g., "postgresql", "mysql", "simulated")
    fn backend_name(&self) -> &str;

    /// Perform a minimal round-trip to the backend
    async fn ping(&self) -> Result<()>;

    /// Close the connection
    ///
    /// Closing an already closed connection must be a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// Parameters used to establish one backend connection
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Backend identifier (e.g., "postgres", "mysql")
    pub backend: String,
    /// Host address
    pub host: String,
    /// Port number (0 for the backend default)
    #[serde(default)]
    pub port: u16,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    /// Username
    #[serde(default)]
    pub username: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// Additional backend-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectOptions {
    /// Create options for the given backend and host
    pub fn new(backend: &str, host: &str) -> Self {
        Self {
            backend: backend.to_string(),
            host: host.to_string(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Set username and password
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set a backend-specific parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a parameter, falling back to the well-known fields
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            _ => None,
        }
    }

    /// `host:port`, or just the host when no port is set
    pub fn address(&self) -> String {
        if self.port == 0 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// Keep credentials out of logs.
impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("params", &self.params)
            .finish()
    }
}
