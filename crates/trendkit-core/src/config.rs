use crate::app_config::{AppConfig, Environment, StorageBackend};
use crate::ConfigError;

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
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

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

    let env = parse_environment(&or_default("TRENDKIT_ENV", "development"))?;
    let storage = parse_storage_backend(&or_default("TRENDKIT_STORAGE", "postgres"))?;

    let database_url = lookup("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
    if storage == StorageBackend::Postgres && database_url.is_none() {
        return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
    }

    let bind_addr = or_default("TRENDKIT_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("TRENDKIT_BIND_ADDR", e.to_string()))?;
    let log_level = or_default("TRENDKIT_LOG_LEVEL", "info");
    let sources_path = PathBuf::from(or_default(
        "TRENDKIT_SOURCES_PATH",
        "./config/sources.yaml",
    ));
    let github_token = lookup("GITHUB_TOKEN").ok().filter(|s| !s.trim().is_empty());
    let user_agent = or_default("TRENDKIT_USER_AGENT", "trendkit/0.1 (trend-collector)");

    let request_timeout_secs = parse_u64("TRENDKIT_REQUEST_TIMEOUT_SECS", "30")?;
    let health_timeout_secs = parse_u64("TRENDKIT_HEALTH_TIMEOUT_SECS", "5")?;
    let health_ttl_secs = parse_u64("TRENDKIT_HEALTH_TTL_SECS", "300")?;
    let max_attempts = parse_u32("TRENDKIT_MAX_ATTEMPTS", "3")?;
    if max_attempts == 0 {
        return Err(invalid(
            "TRENDKIT_MAX_ATTEMPTS",
            "must be at least 1".to_string(),
        ));
    }
    let retry_backoff_base_ms = parse_u64("TRENDKIT_RETRY_BACKOFF_BASE_MS", "1000")?;
    let inter_request_delay_ms = parse_u64("TRENDKIT_INTER_REQUEST_DELAY_MS", "1000")?;
    let report_top_n = parse_usize("TRENDKIT_REPORT_TOP_N", "25")?;
    let report_retention_weeks = parse_u32("TRENDKIT_REPORT_RETENTION_WEEKS", "12")?;
    if report_retention_weeks > crate::MAX_WEEK_SPAN {
        return Err(invalid(
            "TRENDKIT_REPORT_RETENTION_WEEKS",
            format!("must be at most {}", crate::MAX_WEEK_SPAN),
        ));
    }

    let db_max_connections = parse_u32("TRENDKIT_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("TRENDKIT_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("TRENDKIT_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    Ok(AppConfig {
        env,
        storage,
        database_url,
        bind_addr,
        log_level,
        sources_path,
        github_token,
        user_agent,
        request_timeout_secs,
        health_timeout_secs,
        health_ttl_secs,
        max_attempts,
        retry_backoff_base_ms,
        inter_request_delay_ms,
        report_top_n,
        report_retention_weeks,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TRENDKIT_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

fn parse_storage_backend(s: &str) -> Result<StorageBackend, ConfigError> {
    match s {
        "postgres" => Ok(StorageBackend::Postgres),
        "memory" => Ok(StorageBackend::Memory),
        other => Err(ConfigError::InvalidEnvVar {
            var: "TRENDKIT_STORAGE".to_string(),
            reason: format!("unknown storage backend \"{other}\"; expected postgres or memory"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
