use std::time::Duration;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Identity service origin used to confirm accounts still exist. When
    /// unset, every user with a valid token is accepted.
    pub user_directory_url: Option<String>,
    /// Upper bound on each auth collaborator call during the handshake.
    pub auth_timeout: Duration,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Bearer key for `POST /internal/events`. The endpoint is disabled when unset.
    pub internal_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            port: parsed_var("PORT").unwrap_or(4002),
            user_directory_url: optional_var("USER_DIRECTORY_URL"),
            auth_timeout: Duration::from_millis(parsed_var("AUTH_TIMEOUT_MS").unwrap_or(3000)),
            outbound_buffer: parsed_var("OUTBOUND_BUFFER").unwrap_or(256),
            internal_api_key: optional_var("INTERNAL_API_KEY"),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
