use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Global fetch-strategy override.
///
/// `Auto` runs the full fallback chain; `Curated` and `Synthetic` pin the
/// chain to a single deterministic tier, used for local development and
/// deterministic tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Auto,
    Curated,
    Synthetic,
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Auto => write!(f, "auto"),
            FetchMode::Curated => write!(f, "curated"),
            FetchMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub platforms_path: PathBuf,
    pub curated_path: PathBuf,
    /// Bearer tokens accepted by `POST /scrape/trigger`. Empty disables auth.
    pub api_tokens: Vec<String>,

    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,

    pub scrape_interval_secs: u64,
    pub max_concurrent_scrapers: usize,
    pub platform_timeout_secs: u64,
    pub inter_request_delay_ms: u64,
    pub inter_batch_delay_ms: u64,

    pub request_timeout_secs: u64,
    pub max_nav_retries: u32,
    pub nav_retry_base_delay_ms: u64,
    pub browser_enabled: bool,
    pub browser_nav_timeout_secs: u64,
    pub browser_hard_timeout_secs: u64,
    pub selector_wait_secs: u64,
    pub scroll_passes: u32,

    pub fetch_mode: FetchMode,
    pub curated_sample_size: usize,
    pub synthetic_count: usize,
    /// Pins all randomized behaviour (user-agent choice, curated variation,
    /// `is_featured`) for reproducible runs. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("platforms_path", &self.platforms_path)
            .field("curated_path", &self.curated_path)
            .field("database_url", &"[redacted]")
            .field("api_tokens", &format!("[{} token(s)]", self.api_tokens.len()))
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("scrape_interval_secs", &self.scrape_interval_secs)
            .field("max_concurrent_scrapers", &self.max_concurrent_scrapers)
            .field("platform_timeout_secs", &self.platform_timeout_secs)
            .field("inter_request_delay_ms", &self.inter_request_delay_ms)
            .field("inter_batch_delay_ms", &self.inter_batch_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_nav_retries", &self.max_nav_retries)
            .field("nav_retry_base_delay_ms", &self.nav_retry_base_delay_ms)
            .field("browser_enabled", &self.browser_enabled)
            .field("browser_nav_timeout_secs", &self.browser_nav_timeout_secs)
            .field("browser_hard_timeout_secs", &self.browser_hard_timeout_secs)
            .field("selector_wait_secs", &self.selector_wait_secs)
            .field("scroll_passes", &self.scroll_passes)
            .field("fetch_mode", &self.fetch_mode)
            .field("curated_sample_size", &self.curated_sample_size)
            .field("synthetic_count", &self.synthetic_count)
            .field("rng_seed", &self.rng_seed)
            .finish()
    }
}
