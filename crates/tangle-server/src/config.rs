//! Server configuration.
//!
//! Defaults, overridable by an optional `tangle.json` next to the working
//! directory and by `TANGLE_`-prefixed environment variables (highest
//! precedence).

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Configuration for the Tangle server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Path of the `SQLite` database file.
    pub database_path: String,
    /// Maximum size of the database connection pool.
    pub pool_size: u32,
    /// Background session sweep interval in seconds.
    pub sweep_interval_secs: u64,
    /// Timeout for draining connections on shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            database_path: "tangle.db".into(),
            pool_size: 16,
            sweep_interval_secs: 10 * 60,
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Load configuration: defaults, then `tangle.json`, then environment.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file("tangle.json"))
            .merge(Env::prefixed("TANGLE_"))
            .extract()
    }

    /// The address string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
