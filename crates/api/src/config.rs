//! Application configuration loaded from environment variables.

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset means in-memory stores
/// - `CURRENCY`: currency card charges are made in (default: `"usd"`)
/// - `GUEST_SESSION_TTL_SECS`: lifetime of a guest session (default: `900`)
/// - `ADMIN_API_KEY`: key admin routes require; unset disables them
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub currency: String,
    pub guest_session_ttl_secs: u64,
    pub admin_api_key: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty_var("DATABASE_URL"),
            currency: non_empty_var("CURRENCY").unwrap_or(defaults.currency),
            guest_session_ttl_secs: std::env::var("GUEST_SESSION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.guest_session_ttl_secs),
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the guest session lifetime.
    pub fn guest_session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.guest_session_ttl_secs).unwrap_or(i64::MAX))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            currency: saga::DEFAULT_CURRENCY.to_string(),
            guest_session_ttl_secs: 900,
            admin_api_key: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
