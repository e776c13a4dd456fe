use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Upstream hard limit on items per detail call.
const MAX_BATCH_SIZE: usize = 50;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does not load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation run against `lookup` rather than the process
/// environment, so tests can pass a `HashMap`.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("CHANRANK_ENV", "development"));

    let bind_addr = or_default("CHANRANK_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("CHANRANK_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("CHANRANK_LOG_LEVEL", "info");
    let plan_path = PathBuf::from(or_default(
        "CHANRANK_PLAN_PATH",
        "./config/collection_plan.yaml",
    ));

    let upstream_api_keys = parse_key_list(&or_default("CHANRANK_UPSTREAM_API_KEYS", ""));
    let upstream_base_url = or_default(
        "CHANRANK_UPSTREAM_BASE_URL",
        "https://www.googleapis.com/youtube/v3/",
    );
    let upstream_timeout_secs = parse_u64("CHANRANK_UPSTREAM_TIMEOUT_SECS", "30")?;
    let upstream_min_interval_ms = parse_u64("CHANRANK_UPSTREAM_MIN_INTERVAL_MS", "300")?;
    let upstream_daily_unit_ceiling = parse_u64("CHANRANK_UPSTREAM_DAILY_UNIT_CEILING", "10000")?;
    let upstream_search_cost = parse_u64("CHANRANK_UPSTREAM_SEARCH_COST", "100")?;
    let upstream_detail_cost = parse_u64("CHANRANK_UPSTREAM_DETAIL_COST", "1")?;
    let upstream_batch_size = parse_usize("CHANRANK_UPSTREAM_BATCH_SIZE", "50")?;
    if upstream_batch_size == 0 || upstream_batch_size > MAX_BATCH_SIZE {
        return Err(invalid(
            "CHANRANK_UPSTREAM_BATCH_SIZE",
            format!("must be between 1 and {MAX_BATCH_SIZE}, got {upstream_batch_size}"),
        ));
    }

    let collect_max_concurrent_passes = parse_usize("CHANRANK_COLLECT_MAX_CONCURRENT_PASSES", "1")?;
    let collect_refresh_after_hours = parse_u64("CHANRANK_COLLECT_REFRESH_AFTER_HOURS", "24")?;
    let collect_cron = lookup("CHANRANK_COLLECT_CRON")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let cache_ttl_secs = parse_u64("CHANRANK_CACHE_TTL_SECS", "300")?;
    let cache_max_entries = parse_usize("CHANRANK_CACHE_MAX_ENTRIES", "100")?;

    let page_size_min = parse_u32("CHANRANK_PAGE_SIZE_MIN", "10")?;
    let page_size_max = parse_u32("CHANRANK_PAGE_SIZE_MAX", "100")?;
    let page_size_default = parse_u32("CHANRANK_PAGE_SIZE_DEFAULT", "50")?;
    if page_size_min == 0 || page_size_min > page_size_max {
        return Err(invalid(
            "CHANRANK_PAGE_SIZE_MIN",
            format!("must be >= 1 and <= CHANRANK_PAGE_SIZE_MAX ({page_size_max})"),
        ));
    }
    if !(page_size_min..=page_size_max).contains(&page_size_default) {
        return Err(invalid(
            "CHANRANK_PAGE_SIZE_DEFAULT",
            format!("must be between {page_size_min} and {page_size_max}"),
        ));
    }

    let db_max_connections = parse_u32("CHANRANK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CHANRANK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CHANRANK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        plan_path,
        upstream_api_keys,
        upstream_base_url,
        upstream_timeout_secs,
        upstream_min_interval_ms,
        upstream_daily_unit_ceiling,
        upstream_search_cost,
        upstream_detail_cost,
        upstream_batch_size,
        collect_max_concurrent_passes,
        collect_refresh_after_hours,
        collect_cron,
        cache_ttl_secs,
        cache_max_entries,
        page_size_min,
        page_size_max,
        page_size_default,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

/// Split a comma-separated key list, dropping blanks and repeats.
fn parse_key_list(raw: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
