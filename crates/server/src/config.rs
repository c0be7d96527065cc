// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. Oracle settings are optional: without an API key the
// server runs against the deterministic stub backend.

use std::net::SocketAddr;
use std::time::Duration;

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// HMAC secret for session tokens.
    pub session_secret: String,
    /// SQLite database path.
    pub database_path: String,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `redline_server=debug`).
    pub log_filter: String,
    /// OpenAI-compatible chat-completions base URL.
    pub oracle_base_url: String,
    /// Oracle API key; absent means the stub backend.
    pub oracle_api_key: Option<String>,
    /// Oracle model identifier.
    pub oracle_model: String,
    /// Oracle request timeout.
    pub oracle_timeout: Duration,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `REDLINE_HOST` | `0.0.0.0` |
    /// | `REDLINE_PORT` | `8080` |
    /// | `REDLINE_SESSION_SECRET` | dev-only placeholder |
    /// | `REDLINE_DATABASE_PATH` | `redline.db` |
    /// | `REDLINE_CORS_ORIGINS` | *(none — dev defaults)* |
    /// | `REDLINE_LOG_FILTER` | `info` |
    /// | `REDLINE_ORACLE_BASE_URL` | `https://api.groq.com/openai/v1` |
    /// | `REDLINE_ORACLE_API_KEY` | *(none — stub backend)* |
    /// | `REDLINE_ORACLE_MODEL` | `llama-3.1-8b-instant` |
    /// | `REDLINE_ORACLE_TIMEOUT_SECS` | `30` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("REDLINE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("REDLINE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let session_secret = env("REDLINE_SESSION_SECRET").unwrap_or_else(|_| {
            "redline_local_development_session_secret_32_chars".into()
        });

        let database_path = env("REDLINE_DATABASE_PATH").unwrap_or_else(|_| "redline.db".into());
        let cors_origins = env("REDLINE_CORS_ORIGINS").ok();

        let log_filter = env("REDLINE_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let oracle_base_url = env("REDLINE_ORACLE_BASE_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1".into());
        let oracle_api_key = env("REDLINE_ORACLE_API_KEY").ok();
        let oracle_model =
            env("REDLINE_ORACLE_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".into());
        let oracle_timeout = Duration::from_secs(
            env("REDLINE_ORACLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        );

        Self {
            listen_addr,
            session_secret,
            database_path,
            cors_origins,
            log_filter,
            oracle_base_url,
            oracle_api_key,
            oracle_model,
            oracle_timeout,
        }
    }

    /// Returns true when using the development-only session secret.
    pub fn is_dev_session_secret(&self) -> bool {
        self.session_secret == "redline_local_development_session_secret_32_chars"
    }
}
