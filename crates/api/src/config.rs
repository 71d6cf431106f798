/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Generation provider base URL. When unset, the scriptable mock
    /// provider is wired instead (local development).
    pub provider_base_url: Option<String>,
    /// Bearer token for the generation provider.
    pub provider_api_key: Option<String>,
    /// Number of placeholder terms seeded into the in-memory store at
    /// boot (default: `100`).
    pub seed_terms: usize,
    /// Per-identity start throttle: max operation starts per hour.
    /// `0` disables the throttle (default).
    pub max_starts_per_hour: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `PROVIDER_BASE_URL`    | — (mock provider)          |
    /// | `PROVIDER_API_KEY`     | —                          |
    /// | `SEED_TERMS`           | `100`                      |
    /// | `MAX_STARTS_PER_HOUR`  | `0` (disabled)             |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let seed_terms: usize = std::env::var("SEED_TERMS")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("SEED_TERMS must be a valid usize");

        let max_starts_per_hour: u32 = std::env::var("MAX_STARTS_PER_HOUR")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("MAX_STARTS_PER_HOUR must be a valid u32");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            provider_base_url: std::env::var("PROVIDER_BASE_URL").ok(),
            provider_api_key: std::env::var("PROVIDER_API_KEY").ok(),
            seed_terms,
            max_starts_per_hour,
        }
    }
}
