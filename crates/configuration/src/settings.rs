use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
}

/// Where the relational store lives and how many pooled handles to keep.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// A sqlx connection string, e.g. `sqlite://health_system.db`.
    pub url: String,
    pub max_connections: u32,
}

/// Parameters for the HTTP listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Comma-separated list of origins allowed by the CORS policy.
    /// `*` allows any origin.
    pub cors_origins: String,
}

impl ServerSettings {
    /// The address the HTTP listener binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::ValidationError {
                key: "server.host",
                reason: e.to_string(),
            })
    }

    /// Splits `cors_origins` into individual origins.
    ///
    /// Returns an empty list when any origin is allowed, either because the
    /// setting is blank or because one of its entries is `*`.
    pub fn allowed_origins(&self) -> Vec<String> {
        let origins: Vec<String> = self
            .cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if origins.iter().any(|o| o == "*") {
            return Vec::new();
        }
        origins
    }

    #[cfg(feature = "clap")]
    pub fn apply_overrides(&mut self, overrides: &ServerOverrides) {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
    }
}

/// Command-line flags that take precedence over every other settings source.
#[cfg(feature = "clap")]
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ServerOverrides {
    /// The interface to listen on (e.g., "127.0.0.1").
    #[arg(long)]
    pub host: Option<String>,

    /// The TCP port to listen on.
    #[arg(long)]
    pub port: Option<u16>,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                key: "database.url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError {
                key: "database.max_connections",
                reason: "must be at least 1".to_string(),
            });
        }
        self.server.socket_addr()?;
        Ok(())
    }
}
