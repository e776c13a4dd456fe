use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
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

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub plan_path: PathBuf,
    pub upstream_api_keys: Vec<String>,
    pub upstream_base_url: String,
    pub upstream_timeout_secs: u64,
    pub upstream_min_interval_ms: u64,
    pub upstream_daily_unit_ceiling: u64,
    pub upstream_search_cost: u64,
    pub upstream_detail_cost: u64,
    pub upstream_batch_size: usize,
    pub collect_max_concurrent_passes: usize,
    pub collect_refresh_after_hours: u64,
    /// Cron expression for the server's collection job; `None` disables it.
    pub collect_cron: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub page_size_min: u32,
    pub page_size_max: u32,
    pub page_size_default: u32,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("plan_path", &self.plan_path)
            .field("database_url", &"[redacted]")
            .field(
                "upstream_api_keys",
                &format_args!("[{} redacted]", self.upstream_api_keys.len()),
            )
            .field("upstream_base_url", &self.upstream_base_url)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("upstream_min_interval_ms", &self.upstream_min_interval_ms)
            .field(
                "upstream_daily_unit_ceiling",
                &self.upstream_daily_unit_ceiling,
            )
            .field("upstream_search_cost", &self.upstream_search_cost)
            .field("upstream_detail_cost", &self.upstream_detail_cost)
            .field("upstream_batch_size", &self.upstream_batch_size)
            .field(
                "collect_max_concurrent_passes",
                &self.collect_max_concurrent_passes,
            )
            .field(
                "collect_refresh_after_hours",
                &self.collect_refresh_after_hours,
            )
            .field("collect_cron", &self.collect_cron)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("page_size_min", &self.page_size_min)
            .field("page_size_max", &self.page_size_max)
            .field("page_size_default", &self.page_size_default)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
